pub mod history;
pub mod system;
pub mod transcribe;

use actix_web::web;

/// Register every API route
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(system::status)
        .service(transcribe::transcribe)
        .service(history::list_history)
        .service(history::get_history)
        .service(history::delete_history);
}
