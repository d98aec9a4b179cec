#![allow(dead_code)]

use typedstore_core::{DataModel, EntityKind};

pub struct User;

impl EntityKind for User {
    const ENTITY_NAME: &'static str = "User";
}

pub struct Order;

impl EntityKind for Order {
    const ENTITY_NAME: &'static str = "Order";
}

/// Kind that is never registered in `model()`.
pub struct Ghost;

impl EntityKind for Ghost {
    const ENTITY_NAME: &'static str = "Ghost";
}

pub fn model() -> DataModel {
    DataModel::new().with_kind::<User>().with_kind::<Order>()
}
