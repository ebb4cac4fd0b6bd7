pub mod guard;
pub mod health;
pub mod routes;
