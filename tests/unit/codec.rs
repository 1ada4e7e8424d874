use crate::fixtures::{fixed_now, signing_result, SignedOrderBuilder};
use chrono::Duration;
use skus_core::domain::{CredentialType, Metadata};
use skus_core::foundation::{IssuerId, ItemId, OrderId, RequestId};
use skus_core::infrastructure::codec::avro::{AvroReader, AvroWriter};
use skus_core::infrastructure::codec::{SignedOrderStatus, SigningOrder, SigningOrderRequest, SigningOrderResult};
use skus_core::SkusError;

fn metadata() -> Metadata {
    Metadata {
        item_id: ItemId::new_v4(),
        order_id: OrderId::new_v4(),
        issuer_id: IssuerId::new_v4(),
        credential_type: CredentialType::SingleUse.as_str().to_string(),
    }
}

#[test]
fn test_signing_request_when_encoded_then_metadata_survives() {
    let metadata = metadata();
    let request = SigningOrderRequest {
        request_id: RequestId::new("req-1"),
        data: vec![SigningOrder {
            associated_data: metadata.to_json_bytes().unwrap(),
            blinded_tokens: vec!["b1".to_string(), "b2".to_string(), "b3".to_string()],
            issuer_type: "brave.com?sku=brave-talk-premium-credits".to_string(),
            issuer_cohort: 1,
        }],
    };
    let decoded = SigningOrderRequest::decode(&request.encode()).expect("decode");
    assert_eq!(decoded, request);
    assert_eq!(Metadata::from_json_bytes(&decoded.data[0].associated_data).unwrap(), metadata);
}

#[test]
fn test_signing_request_when_empty_data_then_single_terminator() {
    let request = SigningOrderRequest { request_id: RequestId::new("r"), data: Vec::new() };
    let bytes = request.encode();
    // string "r" (len 1 zigzag = 2), then the empty array terminator
    assert_eq!(bytes, vec![2, b'r', 0]);
    assert_eq!(SigningOrderRequest::decode(&bytes).unwrap().data.len(), 0);
}

#[test]
fn test_signing_result_when_tlv2_validity_then_parsed_back() {
    let m = metadata();
    let from = fixed_now();
    let to = from + Duration::days(1);
    let order = SignedOrderBuilder::new(m.order_id, m.item_id, m.issuer_id, CredentialType::TimeLimitedV2).validity(from, to).build();
    let decoded = SigningOrderResult::decode(&signing_result("req-2", vec![order]).encode()).expect("decode");

    let signed = &decoded.data[0];
    assert_eq!(signed.validity().unwrap(), (from, to));
    assert_eq!(signed.metadata().unwrap().credential_type().unwrap(), CredentialType::TimeLimitedV2);
    assert_eq!(signed.blinded_tokens.len(), signed.signed_tokens.len());
}

#[test]
fn test_signing_result_when_every_status_then_enum_index_preserved() {
    let m = metadata();
    let data = [SignedOrderStatus::Ok, SignedOrderStatus::InvalidIssuer, SignedOrderStatus::Error]
        .into_iter()
        .map(|status| SignedOrderBuilder::new(m.order_id, m.item_id, m.issuer_id, CredentialType::SingleUse).status(status).build())
        .collect();
    let decoded = SigningOrderResult::decode(&signing_result("req-3", data).encode()).unwrap();
    assert_eq!(
        decoded.data.iter().map(|order| order.status.as_str()).collect::<Vec<_>>(),
        vec!["ok", "invalid_issuer", "error"]
    );
}

#[test]
fn test_avro_reader_when_bad_union_branch_then_codec_error() {
    let mut w = AvroWriter::new();
    w.long(2).string("x");
    let bytes = w.finish();
    let mut r = AvroReader::new("test", &bytes);
    let err = r.optional_string().unwrap_err();
    assert!(matches!(err, SkusError::Codec { .. }));
    assert!(err.to_string().contains("bad union branch 2"), "{err}");
}

#[test]
fn test_avro_reader_when_negative_block_count_then_reads_block() {
    let mut w = AvroWriter::new();
    // block of 2 items written with a negative count and a byte size
    w.long(-2).long(4).string("a").string("b").long(1).string("c").long(0);
    let bytes = w.finish();
    let mut r = AvroReader::new("test", &bytes);
    assert_eq!(r.string_array().unwrap(), vec!["a", "b", "c"]);
    r.finish().unwrap();
}

#[test]
fn test_avro_reader_when_truncated_then_offset_reported() {
    let mut w = AvroWriter::new();
    w.string("hello");
    let bytes = w.finish();
    let mut r = AvroReader::new("test", &bytes[..3]);
    let err = r.string().unwrap_err();
    assert!(err.to_string().contains("truncated bytes at offset 1"), "{err}");
}

#[test]
fn test_signing_result_when_garbage_then_decode_fails() {
    assert!(SigningOrderResult::decode(b"\xff\xff\xff").is_err());
    assert!(SigningOrderResult::decode(&[]).is_err());
}

#[test]
fn test_avro_long_when_edge_values_then_zigzag_lossless() {
    for value in [0, -1, 1, 63, -64, 64, i32::MAX as i64, i32::MIN as i64, i64::MAX, i64::MIN] {
        let mut w = AvroWriter::new();
        w.long(value);
        let bytes = w.finish();
        assert!(bytes.len() <= 10, "{value} took {} bytes", bytes.len());
        let mut r = AvroReader::new("test", &bytes);
        assert_eq!(r.long().unwrap(), value);
        r.finish().unwrap();
    }
}
