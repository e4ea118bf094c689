pub mod calc;
pub mod db;
pub mod server;
pub mod token;
pub mod tools;
