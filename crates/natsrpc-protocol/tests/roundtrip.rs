//! Codec round-trips over arbitrary envelopes.

use natsrpc_protocol::{
    Flags, RequestEnvelope, RequestHeader, ResponseEnvelope, ResponseHeader, decode, encode,
};
use proptest::prelude::*;
use serde_json::{Map, Value};

fn arb_value() -> impl Strategy<Value = Value> {
    prop_oneof![
        "\\PC{0,16}".prop_map(Value::from),
        any::<i64>().prop_map(Value::from),
        any::<bool>().prop_map(Value::from),
        Just(Value::Null),
    ]
}

fn arb_map() -> impl Strategy<Value = Map<String, Value>> {
    proptest::collection::btree_map("[a-z]{1,8}", arb_value(), 0..4)
        .prop_map(|entries| entries.into_iter().collect())
}

fn arb_flags() -> impl Strategy<Value = Flags> {
    prop_oneof![
        arb_map().prop_map(Flags::Generic),
        "\\PC{0,12}".prop_map(Flags::relation),
        "\\PC{0,12}".prop_map(|identity| {
            Flags::Generic([("identity".to_string(), Value::from(identity))].into_iter().collect())
        }),
        (any::<u32>(), arb_map())
            .prop_map(|(index, route)| Flags::Generic(route).with_chunk_index(index)),
    ]
}

fn arb_text() -> impl Strategy<Value = Option<String>> {
    proptest::option::of("\\PC{0,12}")
}

fn arb_request() -> impl Strategy<Value = RequestEnvelope> {
    (
        "[A-Z]{1,6}",
        "/[a-z0-9/{}]{0,24}",
        arb_flags(),
        "[A-Za-z0-9-]{0,16}",
        arb_text(),
        proptest::collection::vec(any::<u8>(), 0..64),
    )
        .prop_map(|(mode, path, flags, authorization, accept, body)| RequestEnvelope {
            header: RequestHeader {
                mode,
                path,
                flags,
                authorization,
                accept,
            },
            body,
        })
}

fn arb_response() -> impl Strategy<Value = ResponseEnvelope> {
    let metadata = (
        any::<bool>(),
        proptest::option::of(any::<i64>()),
        arb_text(),
        arb_text(),
        arb_text(),
    );
    let status = (
        100u16..600,
        arb_text(),
        arb_text(),
        any::<u32>(),
        proptest::option::of(proptest::collection::vec(any::<u8>(), 0..16)),
        proptest::option::of(any::<u64>()),
    );
    (metadata, status, "\\PC{0,32}").prop_map(
        |(
            (created, timestamp, path, doc, doc_version),
            (status, error_str, server_id, chunks, encrypted_hdr, total_size),
            response,
        )| ResponseEnvelope {
            header: ResponseHeader {
                created,
                timestamp,
                path,
                doc,
                doc_version,
                status,
                error_str,
                server_id,
                chunks,
                encrypted_hdr,
                total_size,
            },
            response,
        },
    )
}

proptest! {
    #[test]
    fn request_survives_the_wire(request in arb_request()) {
        let decoded: RequestEnvelope = decode(&encode(&request).unwrap()).unwrap();
        prop_assert_eq!(&decoded, &request);
        prop_assert_eq!(decoded.header.flags.chunk_index(), request.header.flags.chunk_index());
        prop_assert_eq!(decoded.header.flags.identity(), request.header.flags.identity());
    }

    #[test]
    fn response_survives_the_wire(response in arb_response()) {
        let decoded: ResponseEnvelope = decode(&encode(&response).unwrap()).unwrap();
        prop_assert_eq!(&decoded, &response);
        prop_assert_eq!(decoded.is_chunked(), response.is_chunked());
    }

    #[test]
    fn encoding_is_stable(response in arb_response()) {
        let once = encode(&response).unwrap();
        let decoded: ResponseEnvelope = decode(&once).unwrap();
        prop_assert_eq!(encode(&decoded).unwrap(), once);
    }
}
