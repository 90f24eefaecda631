//! Proptest generators for property-based testing.

use proptest::prelude::*;
use serde_json::{json, Value};

use sharedstore_core::{Envelope, InstanceId, Namespace};

/// Generate a valid namespace string.
pub fn namespace_name() -> impl Strategy<Value = String> {
    "[a-z][a-z0-9_.:/-]{0,31}".prop_map(String::from)
}

/// Generate a validated namespace.
pub fn namespace() -> impl Strategy<Value = Namespace> {
    namespace_name().prop_filter_map("namespace must validate", |name| Namespace::new(name).ok())
}

/// Generate a string no store accepts as a namespace.
pub fn invalid_namespace() -> impl Strategy<Value = String> {
    prop_oneof![
        Just(String::new()),
        "[ \t\n]{1,8}".prop_map(String::from),
        "[a-z]{0,4}\\x07[a-z]{0,4}".prop_map(String::from),
    ]
}

/// Generate an instance id.
pub fn instance_id() -> impl Strategy<Value = InstanceId> {
    any::<[u8; 16]>().prop_map(|bytes| {
        InstanceId::new(bytes.iter().map(|b| format!("{b:02x}")).collect::<String>())
    })
}

/// Generate a small JSON value of any shape.
pub fn json_value() -> impl Strategy<Value = Value> {
    let leaf = prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        any::<i64>().prop_map(|n| json!(n)),
        "[a-zA-Z0-9 ]{0,16}".prop_map(Value::String),
    ];
    leaf.prop_recursive(3, 16, 4, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..4).prop_map(Value::Array),
            prop::collection::btree_map("[a-z]{1,6}", inner, 0..4)
                .prop_map(|m| Value::Object(m.into_iter().collect())),
        ]
    })
}

/// Generate a well-formed envelope carrying an integer.
pub fn envelope() -> impl Strategy<Value = Envelope> {
    (instance_id(), any::<i64>()).prop_map(|(id, n)| Envelope::new(id, json!(n)))
}

/// Generate a JSON value that is not a well-formed envelope.
pub fn malformed_envelope() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(Value::Null),
        any::<i64>().prop_map(|n| json!(n)),
        "[a-z]{0,8}".prop_map(Value::String),
        any::<i64>().prop_map(|n| json!({ "message": n })),
        Just(json!({ "instanceId": "", "message": 1 })),
        "[a-f0-9]{1,8}".prop_map(|id| json!({ "instanceId": id })),
    ]
}

/// One mutation applied to a store in a generated scenario.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreOp {
    /// Replace the value.
    Set(i64),
    /// Add to the current value.
    Add(i64),
}

impl StoreOp {
    /// Apply to a plain integer model.
    pub fn apply(&self, current: i64) -> i64 {
        match self {
            StoreOp::Set(n) => *n,
            StoreOp::Add(n) => current.wrapping_add(*n),
        }
    }
}

impl Arbitrary for StoreOp {
    type Parameters = ();
    type Strategy = BoxedStrategy<Self>;

    fn arbitrary_with(_: Self::Parameters) -> Self::Strategy {
        prop_oneof![
            (-1000i64..=1000).prop_map(StoreOp::Set),
            (-10i64..=10).prop_map(StoreOp::Add),
        ]
        .boxed()
    }
}

/// Generate a sequence of store mutations.
pub fn ops(max_len: usize) -> impl Strategy<Value = Vec<StoreOp>> {
    prop::collection::vec(any::<StoreOp>(), 0..=max_len)
}
