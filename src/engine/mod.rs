pub mod effects;
pub mod lifecycle;
pub mod pricing;
pub mod reconcile;
pub mod transitions;
