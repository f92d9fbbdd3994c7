//---------------------------------------
pub mod models;
pub mod validation;
pub mod view;
pub mod present;
//---------------------------------------

//---------------------------------------
pub mod store;
pub mod persist;
pub mod identity;
//---------------------------------------

//---------------------------------------
pub mod config;
pub mod telemetry;
pub mod state;
pub mod error;
pub mod dto;
pub mod auth;
pub mod api;
pub mod accounts;
pub mod routes;
//---------------------------------------

//---------------------------------------
pub mod client;
//---------------------------------------

pub use models::{NewTask, Registration, Session, SessionUser, Task, TaskDraft, TaskPatch, TaskStatus};
pub use routes::{app, map_routes};
pub use state::{AppState, SharedState};
