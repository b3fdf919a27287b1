pub mod aggregates;
pub mod entities;
pub mod intent;
pub mod record;
pub mod value_objects;
