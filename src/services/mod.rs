pub mod cache;
pub mod history;
pub mod lookup;
pub mod openweather;
pub mod pruner;
