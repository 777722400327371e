//! Golden test vectors for deterministic verification.
//!
//! These vectors pin the canonical payload text, the block hash and the QR
//! token, so any change to canonicalization or hashing shows up here first.

use cocoa_trace_core::{
    compute_block_hash, qr::INITIAL_SUFFIX_LEN, Block, BlockHash, DeliveryRef, Payload, QrToken,
};

/// A golden test vector.
#[derive(Debug, Clone)]
pub struct GoldenVector {
    /// Human-readable name for the vector.
    pub name: &'static str,
    pub block_number: u64,
    /// Hex of the previous block hash.
    pub previous_hash: &'static str,
    /// Unix milliseconds.
    pub created_at: i64,
    pub delivery_ref: &'static str,
    /// Payload as JSON text, in any key order.
    pub payload_json: &'static str,
    /// Expected canonical payload text.
    pub expected_canonical: &'static str,
    /// Expected block hash (hex).
    pub expected_hash: &'static str,
    /// Expected QR token with the initial suffix length.
    pub expected_qr_token: &'static str,
}

const GENESIS_HASH: &str = "110bec671f96ce665f94a781700c2de64329d2333333d33168d282e3670b126b";

/// Get all golden test vectors.
pub fn all_vectors() -> Vec<GoldenVector> {
    vec![
        GoldenVector {
            name: "genesis delivery",
            block_number: 1,
            previous_hash: "0000000000000000000000000000000000000000000000000000000000000000",
            created_at: 1_709_251_200_000, // 2024-03-01T00:00:00Z
            delivery_ref: "D-1042",
            payload_json: r#"{"planter_id":"P-17","date":"2024-03-01","quantity_kg":1250.5,"quality":"A","load_location":"Soubré","unload_location":"San Pedro","delivery_id":"D-1042"}"#,
            expected_canonical: r#"{"date":"2024-03-01","delivery_id":"D-1042","load_location":"Soubré","planter_id":"P-17","quality":"A","quantity_kg":1250.5,"unload_location":"San Pedro"}"#,
            expected_hash: GENESIS_HASH,
            expected_qr_token: "COCOA-D-1042-110bec67",
        },
        GoldenVector {
            name: "second delivery with nested and escaped fields",
            block_number: 2,
            previous_hash: GENESIS_HASH,
            created_at: 1_709_251_290_000,
            delivery_ref: "D-1043",
            payload_json: r#"{"quantity_kg":430,"planter_id":"P-17","notes":"sacs \"12-14\"\nre-weighed","lots":["L1","L2"],"date":"2024-03-01","quality":"B","moisture_pct":7.25,"load_location":"Daloa","certified":true,"unload_location":"Abidjan port","delivery_id":"D-1043"}"#,
            expected_canonical: r#"{"certified":true,"date":"2024-03-01","delivery_id":"D-1043","load_location":"Daloa","lots":["L1","L2"],"moisture_pct":7.25,"notes":"sacs \"12-14\"\nre-weighed","planter_id":"P-17","quality":"B","quantity_kg":430,"unload_location":"Abidjan port"}"#,
            expected_hash: "d3ab9a43ce3a62d29afe8490c3217532dd943fc9325123615b3d498d8448d837",
            expected_qr_token: "COCOA-D-1043-d3ab9a43",
        },
        GoldenVector {
            name: "empty payload at epoch",
            block_number: 7,
            previous_hash: "aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa",
            created_at: 0,
            delivery_ref: "EMPTY",
            payload_json: "{}",
            expected_canonical: "{}",
            expected_hash: "fcbdbdfc3bf2bb973204667f2d47b8ab19cb1744d6d84b46cb9b74bac6f05a29",
            expected_qr_token: "COCOA-EMPTY-fcbdbdfc",
        },
    ]
}

/// Build the block described by a golden vector.
pub fn block_from_vector(vector: &GoldenVector) -> Block {
    let delivery_ref = DeliveryRef::new(vector.delivery_ref).expect("vector delivery ref");
    let payload = Payload::from_json_str(vector.payload_json).expect("vector payload json");
    let previous_hash = BlockHash::from_hex(vector.previous_hash).expect("vector previous hash");
    let hash = compute_block_hash(vector.block_number, &previous_hash, vector.created_at, &payload)
        .expect("vector payload canonicalizes");

    Block {
        block_number: vector.block_number,
        qr_token: QrToken::derive(&delivery_ref, &hash, INITIAL_SUFFIX_LEN),
        delivery_ref,
        payload,
        created_at: vector.created_at,
        previous_hash,
        hash,
        verified_at: None,
    }
}

/// Check every vector; returns `(name, matches, computed hash)`.
pub fn verify_all_vectors() -> Vec<(String, bool, String)> {
    all_vectors()
        .iter()
        .map(|v| {
            let block = block_from_vector(v);
            let hex = block.hash.to_hex();
            let canonical = block.payload.canonical_string().unwrap_or_default();
            let matches = hex == v.expected_hash
                && canonical == v.expected_canonical
                && block.qr_token.as_str() == v.expected_qr_token;
            (v.name.to_string(), matches, hex)
        })
        .collect()
}
