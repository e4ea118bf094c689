// handlers/mod.rs - HTTP route handlers grouped by API area
//
// Public routers (health, calculator, token exchange, Twilio webhook) are
// mounted without authentication; every other router sits behind the JWT
// middleware in `app::router`.

pub mod auth;
pub mod calculator;
pub mod crm;
pub mod documents;
pub mod health;
pub mod loans;
pub mod whatsapp;
