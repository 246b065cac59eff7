pub mod deposit;
pub mod payments;
pub mod reconcile;
