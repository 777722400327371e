//! Proptest generators for property-based testing.

use proptest::prelude::*;

use cocoa_trace_core::{
    compute_block_hash, qr::INITIAL_SUFFIX_LEN, Block, BlockHash, DeliveryRef, Payload, QrToken,
    Value,
};

/// Generate a random BlockHash.
pub fn block_hash() -> impl Strategy<Value = BlockHash> {
    any::<[u8; 32]>().prop_map(BlockHash::from_bytes)
}

/// Generate a valid delivery reference.
pub fn delivery_ref() -> impl Strategy<Value = DeliveryRef> {
    "[A-Za-z0-9][A-Za-z0-9._-]{0,23}"
        .prop_map(|s| DeliveryRef::new(s).expect("pattern yields valid delivery refs"))
}

/// Generate a reasonable timestamp in Unix milliseconds.
pub fn timestamp() -> impl Strategy<Value = i64> {
    0i64..=4_102_444_800_000
}

/// Generate a payload field name.
pub fn field_name() -> impl Strategy<Value = String> {
    "[a-z][a-z0-9_]{0,15}".prop_map(String::from)
}

/// Generate an arbitrary finite value, nested up to a few levels.
pub fn value() -> impl Strategy<Value = Value> {
    let leaf = prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        any::<i64>().prop_map(Value::from),
        (-1.0e9f64..1.0e9).prop_map(Value::Float),
        "\\PC{0,24}".prop_map(Value::Text),
    ];
    leaf.prop_recursive(3, 24, 6, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..6).prop_map(Value::Array),
            prop::collection::btree_map(field_name(), inner, 0..6)
                .prop_map(|m| Value::Map(m.into_iter().collect())),
        ]
    })
}

/// Generate a delivery payload: every default required field plus extras.
pub fn delivery_payload() -> impl Strategy<Value = Payload> {
    (
        "P-[0-9]{1,4}",
        0.1f64..50_000.0,
        prop_oneof![Just("A"), Just("B"), Just("grade_1"), Just("grade_2")],
        "[A-Z][a-z]{2,12}",
        "[A-Z][a-z]{2,12}",
        prop::collection::btree_map("x_[a-z]{1,8}", value(), 0..4),
    )
        .prop_map(|(planter, kg, quality, from, to, extras)| {
            let mut payload = Payload::new()
                .with("planter_id", planter)
                .with("date", "2024-03-01")
                .with("quantity_kg", kg)
                .with("quality", quality)
                .with("load_location", from)
                .with("unload_location", to);
            for (k, v) in extras {
                payload.insert(k, v);
            }
            payload
        })
}

/// Parameters for generating a delivery.
#[derive(Debug, Clone)]
pub struct DeliveryParams {
    pub delivery_ref: DeliveryRef,
    pub payload: Payload,
    pub created_at: i64,
}

impl Arbitrary for DeliveryParams {
    type Parameters = ();
    type Strategy = BoxedStrategy<Self>;

    fn arbitrary_with(_: Self::Parameters) -> Self::Strategy {
        (delivery_ref(), delivery_payload(), timestamp())
            .prop_map(|(delivery_ref, payload, created_at)| DeliveryParams {
                delivery_ref,
                payload,
                created_at,
            })
            .boxed()
    }
}

/// Parameters for a whole chain: distinct deliveries in append order.
#[derive(Debug, Clone)]
pub struct ChainParams {
    pub deliveries: Vec<(DeliveryRef, Payload)>,
    /// Clock step between appends, in milliseconds.
    pub step_millis: i64,
}

impl Arbitrary for ChainParams {
    type Parameters = ();
    type Strategy = BoxedStrategy<Self>;

    fn arbitrary_with(_: Self::Parameters) -> Self::Strategy {
        (
            prop::collection::vec(delivery_payload(), 1..12),
            0i64..=86_400_000,
        )
            .prop_map(|(payloads, step_millis)| ChainParams {
                deliveries: payloads
                    .into_iter()
                    .enumerate()
                    .map(|(i, payload)| {
                        let d = DeliveryRef::new(format!("D{}", i + 1))
                            .expect("numbered delivery refs are valid");
                        (d, payload)
                    })
                    .collect(),
                step_millis,
            })
            .boxed()
    }
}

/// Build a block from parameters, as the ledger would at `block_number`
/// after `previous_hash`.
pub fn block_from_params(params: &DeliveryParams, block_number: u64, previous_hash: BlockHash) -> Block {
    let hash = compute_block_hash(block_number, &previous_hash, params.created_at, &params.payload)
        .expect("generated payloads are finite and shallow");
    Block {
        block_number,
        qr_token: QrToken::derive(&params.delivery_ref, &hash, INITIAL_SUFFIX_LEN),
        delivery_ref: params.delivery_ref.clone(),
        payload: params.payload.clone(),
        created_at: params.created_at,
        previous_hash,
        hash,
        verified_at: None,
    }
}
