//! SeaORM entity definitions for PostgreSQL database.

pub mod environment;
pub mod release;
pub mod test_run;
pub mod test_run_step;
pub mod test_set;
