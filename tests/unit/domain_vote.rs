use crate::fixtures::{fixed_now, vote_text, CARD_VOTE_ISSUER, WALLET_VOTE_ISSUER};
use skus_core::domain::vote::group_by_issuer;
use skus_core::domain::{deduplicate_credential_bindings, CredentialBinding, CredentialRedemption, FundingSource, Vote, VoteEvent, VoteRecord, VoteType};
use skus_core::infrastructure::codec::{decode_vote_event, encode_vote_event};
use skus_core::SkusError;

fn redemption(issuer: &str, preimage: &str) -> CredentialRedemption {
    CredentialRedemption { issuer: issuer.to_string(), token_preimage: preimage.to_string(), signature: format!("sig-{preimage}") }
}

#[test]
fn test_vote_text_when_each_known_type_then_decodes() {
    for (raw, expected) in
        [("auto-contribute", VoteType::AutoContribute), ("oneoff-tip", VoteType::OneoffTip), ("recurring-tip", VoteType::RecurringTip)]
    {
        let vote = Vote::decode_base64(&vote_text(raw, "brave.com")).expect("decode vote");
        assert_eq!(vote.vote_type, expected);
        assert_eq!(vote.channel, "brave.com");
    }
}

#[test]
fn test_vote_text_when_not_json_then_invalid_vote() {
    let text = skus_core::foundation::util::encoding::encode_base64("type=oneoff-tip");
    assert!(matches!(Vote::decode_base64(&text), Err(SkusError::InvalidVote(_))));
}

#[test]
fn test_group_by_issuer_when_interleaved_then_first_seen_order_kept() {
    let groups = group_by_issuer(vec![
        redemption(CARD_VOTE_ISSUER, "a"),
        redemption(WALLET_VOTE_ISSUER, "b"),
        redemption(CARD_VOTE_ISSUER, "c"),
        redemption(WALLET_VOTE_ISSUER, "d"),
    ])
    .expect("group");
    assert_eq!(groups.len(), 2);
    assert_eq!(groups[0].issuer, CARD_VOTE_ISSUER);
    assert_eq!(groups[0].funding_source, FundingSource::AnonymousCard);
    assert_eq!(groups[0].redemptions.iter().map(|r| r.token_preimage.as_str()).collect::<Vec<_>>(), vec!["a", "c"]);
    assert_eq!(groups[1].funding_source, FundingSource::UserWallet);
}

#[test]
fn test_group_by_issuer_when_unknown_merchant_then_whole_batch_rejected() {
    let result = group_by_issuer(vec![redemption(WALLET_VOTE_ISSUER, "a"), redemption("brave.software?sku=user-wallet-vote", "b")]);
    assert!(matches!(result, Err(SkusError::InvalidVote(_))));
}

#[test]
fn test_credential_bindings_when_preimage_repeated_then_first_kept() {
    let bindings = vec![
        CredentialBinding { public_key: "pk-1".to_string(), token_preimage: "t".to_string(), signature: "first".to_string() },
        CredentialBinding { public_key: "pk-2".to_string(), token_preimage: "t".to_string(), signature: "second".to_string() },
    ];
    let deduped = deduplicate_credential_bindings(bindings);
    assert_eq!(deduped.len(), 1);
    assert_eq!(deduped[0].signature, "first");
}

#[test]
fn test_vote_record_when_marked_then_no_longer_pending() {
    let credentials = serde_json::to_string(&vec![redemption(WALLET_VOTE_ISSUER, "a")]).expect("json");
    let mut record = VoteRecord::new(credentials, vote_text("oneoff-tip", "brave.com"), Vec::new(), fixed_now());
    assert!(record.is_pending());
    assert_eq!(record.redemptions().expect("redemptions")[0].issuer, WALLET_VOTE_ISSUER);

    record.erred = true;
    assert!(!record.is_pending());
    record.erred = false;
    record.processed = true;
    assert!(!record.is_pending());
}

#[test]
fn test_vote_event_when_encoded_then_ledger_fields_decode() {
    let vote = Vote { vote_type: VoteType::RecurringTip, channel: "youtube#channel:abc".to_string() };
    let event = VoteEvent::new(&vote, 7, FundingSource::UserWallet, fixed_now());
    assert_eq!(event.base_vote_value, "0.25");

    let decoded = decode_vote_event(&encode_vote_event(&event)).expect("decode vote event");
    assert_eq!(decoded.vote_tally, 7);
    assert_eq!(decoded.channel, "youtube#channel:abc");
    assert_eq!(decoded.funding_source, FundingSource::UserWallet);
    assert_eq!(decoded.created_at, fixed_now());
}

#[test]
fn test_vote_event_when_truncated_then_codec_error() {
    let vote = Vote { vote_type: VoteType::OneoffTip, channel: "brave.com".to_string() };
    let bytes = encode_vote_event(&VoteEvent::new(&vote, 1, FundingSource::AnonymousCard, fixed_now()));
    let err = decode_vote_event(&bytes[..bytes.len() - 3]).unwrap_err();
    assert!(matches!(err, SkusError::Codec { .. }), "{err}");
}
