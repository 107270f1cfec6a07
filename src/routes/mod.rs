pub mod health;
pub mod pruner;
pub mod weather;
