use crate::fixtures::{fixed_now, OrderBuilder, OrderItemBuilder};
use chrono::Duration;
use rust_decimal::Decimal;
use skus_core::domain::order::{ensure_equal_payment_methods, validate_transition};
use skus_core::domain::{CredentialType, IssuerConfig, OrderStatus};
use skus_core::foundation::IsoDuration;
use skus_core::SkusError;

#[test]
fn test_order_status_when_transition_table_walked_then_only_listed_moves_allowed() {
    use OrderStatus::*;
    let allowed = [(Pending, Paid), (Pending, Canceled), (Paid, PastDue), (Paid, Canceled), (PastDue, Paid), (PastDue, Canceled), (Canceled, Paid)];
    for from in [Pending, Paid, Canceled, PastDue] {
        for to in [Pending, Paid, Canceled, PastDue] {
            let expected = from == to || allowed.contains(&(from, to));
            assert_eq!(validate_transition(from, to).valid, expected, "{from} -> {to}");
        }
    }
}

#[test]
fn test_order_transition_when_same_status_then_updated_at_untouched() {
    let mut order = OrderBuilder::default().paid_at(fixed_now()).build();
    let before = order.updated_at;
    order.transition_to(OrderStatus::Paid, fixed_now() + Duration::hours(1)).expect("no-op");
    assert_eq!(order.updated_at, before);

    order.transition_to(OrderStatus::Canceled, fixed_now() + Duration::hours(2)).expect("cancel");
    assert_eq!(order.status, OrderStatus::Canceled);
    assert_eq!(order.updated_at, fixed_now() + Duration::hours(2));
}

#[test]
fn test_order_transition_when_paid_back_to_pending_then_rejected() {
    let mut order = OrderBuilder::default().paid_at(fixed_now()).build();
    let err = order.transition_to(OrderStatus::Pending, fixed_now()).unwrap_err();
    assert!(matches!(err, SkusError::InvalidStateTransition { .. }));
    assert_eq!(order.status, OrderStatus::Paid);
}

#[test]
fn test_order_is_paid_when_canceled_then_depends_on_expiry() {
    let now = fixed_now();
    let canceled_active = OrderBuilder::default().status(OrderStatus::Canceled).expires_at(Some(now + Duration::days(1))).build();
    assert!(canceled_active.is_paid(now));

    let canceled_expired = OrderBuilder::default().status(OrderStatus::Canceled).expires_at(Some(now - Duration::seconds(1))).build();
    assert!(!canceled_expired.is_paid(now));

    let canceled_no_expiry = OrderBuilder::default().status(OrderStatus::Canceled).expires_at(None).build();
    assert!(!canceled_no_expiry.is_paid(now));

    assert!(!OrderBuilder::default().status(OrderStatus::PastDue).build().is_paid(now));
    assert!(!OrderBuilder::default().build().is_paid(now));
}

#[test]
fn test_order_total_when_items_priced_then_matches_sum_of_subtotals() {
    let order = OrderBuilder::default()
        .item(OrderItemBuilder::default().price(Decimal::new(999, 2)))
        .item(OrderItemBuilder::default().sku("brave-talk-premium-credits").price(Decimal::new(25, 2)))
        .build();
    assert!(order.total_matches_items());
    assert_eq!(order.total_price, Decimal::new(1024, 2));
    assert!(order.items.iter().all(|item| item.order_id == order.id));
}

#[test]
fn test_payment_methods_when_same_set_in_other_order_then_equal() {
    let a = vec!["stripe".to_string(), "radom".to_string()];
    let b = vec!["radom".to_string(), "stripe".to_string()];
    assert!(ensure_equal_payment_methods(&a, &b).is_ok());

    let err = ensure_equal_payment_methods(&a, &["stripe".to_string()]).unwrap_err();
    assert!(matches!(err, SkusError::MixedOrderItems { .. }));

    let order = OrderBuilder::default().build();
    assert!(order.is_payable_by("stripe"));
    assert!(!order.is_payable_by("radom"));
}

#[test]
fn test_order_item_when_no_issuance_interval_then_defaults_to_one_day() {
    let item = OrderItemBuilder::default().build(Default::default());
    assert_eq!(item.issuance_interval(), IsoDuration::parse("P1D").unwrap());

    let hourly = OrderItemBuilder::default().issuance_interval("PT1H").build(Default::default());
    assert_eq!(hourly.issuance_interval().hours, 1);
}

#[test]
fn test_order_item_when_leo_variant_then_detected() {
    let leo = OrderItemBuilder::default().sku("brave-leo-premium-year").credential_type(CredentialType::TimeLimitedV2).build(Default::default());
    assert!(leo.is_leo());
    assert!(!OrderItemBuilder::default().build(Default::default()).is_leo());
}

#[test]
fn test_issuer_config_when_default_then_thirty_five_intervals() {
    assert_eq!(IssuerConfig::default().num_intervals(), 35);
    assert_eq!(IssuerConfig { buffer: 1, overlap: 0 }.num_intervals(), 1);
}

#[test]
fn test_credential_type_when_parsed_then_wire_names_match() {
    for (raw, expected) in
        [("single-use", CredentialType::SingleUse), ("time-limited", CredentialType::TimeLimited), ("time-limited-v2", CredentialType::TimeLimitedV2)]
    {
        let parsed: CredentialType = raw.parse().expect("credential type");
        assert_eq!(parsed, expected);
        assert_eq!(parsed.to_string(), raw);
    }
    assert!(matches!("time-limited-v3".parse::<CredentialType>(), Err(SkusError::InvalidCredentialType(_))));
}
