#![cfg(feature = "test-util")]

mod common;

use common::Order;
use tabletheory::stream::{decode_record, unmarshal_image, EventName};

#[test]
fn decodes_a_modify_record_and_unmarshals_the_new_image_into_a_model() {
    let raw = serde_json::json!({
        "eventName": "MODIFY",
        "dynamodb": {
            "OldImage": {
                "pk": {"S": "cust#1"},
                "sk": {"S": "order#1"},
                "customer_name": {"S": "Ada"},
                "quantity": {"N": "1"},
                "version": {"N": "0"},
                "created_at": {"NULL": true},
                "updated_at": {"NULL": true},
            },
            "NewImage": {
                "pk": {"S": "cust#1"},
                "sk": {"S": "order#1"},
                "customer_name": {"S": "Ada"},
                "quantity": {"N": "2"},
                "version": {"N": "1"},
                "created_at": {"NULL": true},
                "updated_at": {"S": "2026-02-01T00:00:00Z"},
            },
        },
    });

    let record = decode_record(&raw).unwrap();
    assert_eq!(record.event_name, EventName::Modify);

    let new_order: Order = unmarshal_image(record.new_image.as_ref().unwrap()).unwrap();
    assert_eq!(new_order.quantity, 2);
    assert_eq!(new_order.version, 1);
    assert_eq!(new_order.updated_at.as_deref(), Some("2026-02-01T00:00:00Z"));

    let old_order: Order = unmarshal_image(record.old_image.as_ref().unwrap()).unwrap();
    assert_eq!(old_order.quantity, 1);
    assert!(old_order.updated_at.is_none());
}

#[test]
fn a_remove_record_carries_only_the_old_image() {
    let raw = serde_json::json!({
        "eventName": "REMOVE",
        "dynamodb": {
            "OldImage": {
                "pk": {"S": "cust#1"},
                "sk": {"S": "order#1"},
                "customer_name": {"S": "Ada"},
                "quantity": {"N": "1"},
                "version": {"N": "0"},
                "created_at": {"NULL": true},
                "updated_at": {"NULL": true},
            },
        },
    });

    let record = decode_record(&raw).unwrap();
    assert_eq!(record.event_name, EventName::Remove);
    assert!(record.new_image.is_none());
    assert!(record.old_image.is_some());
}
