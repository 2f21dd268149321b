use crate::{Cardinality, DescriptorRegistry, EntityDescriptor};
use std::sync::Arc;

/// Order / LineItem / Product / Customer model shared by the unit tests
pub struct Fixture {
    pub order: Arc<EntityDescriptor>,
    pub line_item: Arc<EntityDescriptor>,
    pub product: Arc<EntityDescriptor>,
    pub customer: Arc<EntityDescriptor>,
    pub note: Arc<EntityDescriptor>,
}

impl Fixture {
    pub fn new() -> Self {
        let mut registry = DescriptorRegistry::new();

        let order = registry
            .register(
                EntityDescriptor::new("Order")
                    .key("id")
                    .foreign_key("customerId")
                    .field("status")
                    .field("amount")
                    .relation("LineItems", Cardinality::Many, "LineItem")
                    .relation("Customer", Cardinality::Single, "Customer"),
            )
            .expect("register Order");

        let line_item = registry
            .register(
                EntityDescriptor::new("LineItem")
                    .key("orderId")
                    .key("lineNo")
                    .foreign_key("productId")
                    .field("qty")
                    .relation("Product", Cardinality::Single, "Product")
                    .relation("Order", Cardinality::Single, "Order"),
            )
            .expect("register LineItem");

        let product = registry
            .register(EntityDescriptor::new("Product").key("id").field("price"))
            .expect("register Product");

        let customer = registry
            .register(
                EntityDescriptor::new("Customer")
                    .key("id")
                    .field("name")
                    .relation("Orders", Cardinality::Many, "Order"),
            )
            .expect("register Customer");

        let note = registry
            .register(EntityDescriptor::new("Note").field("text").not_auditable())
            .expect("register Note");

        Self {
            order,
            line_item,
            product,
            customer,
            note,
        }
    }
}

pub const ORDER_DOCUMENT: &str = r#"{
  "types": [
    {
      "type": "Order",
      "fields": ["id", "customerId", "status"],
      "primary_key": ["id"],
      "foreign_keys": ["customerId"],
      "relations": [
        {"name": "LineItems", "cardinality": "many", "target": "LineItem"},
        {"name": "Customer", "cardinality": "single", "target": "Customer"}
      ]
    },
    {"type": "LineItem", "fields": ["id", "qty"], "primary_key": ["id"]},
    {"type": "Customer", "fields": ["id"], "primary_key": ["id"]}
  ],
  "entities": [
    {
      "type": "Order",
      "state": "Unchanged",
      "fields": {
        "id": {"original": "1", "current": "1"},
        "customerId": {"original": "77", "current": "77"}
      },
      "relations": [
        {"name": "LineItems", "targets": [1]},
        {"name": "Customer", "loaded": false}
      ]
    },
    {
      "type": "LineItem",
      "state": "Modified",
      "fields": {
        "id": {"original": "5", "current": "5"},
        "qty": {"original": "1", "current": "2"}
      }
    }
  ]
}"#;
