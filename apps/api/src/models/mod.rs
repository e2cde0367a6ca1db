pub mod health;
pub mod response;
pub mod retention;
pub mod session;
pub mod survey;
