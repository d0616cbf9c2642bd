//! Helpers shared by the engine's own tests: a fresh migrated SQLite environment, seed data, and a
//! scripted payment gateway that records its calls.
pub mod mock_gateway;
pub mod prepare_env;
pub mod seed;

pub use mock_gateway::MockGateway;
pub use prepare_env::{prepare_test_env, random_db_path};
