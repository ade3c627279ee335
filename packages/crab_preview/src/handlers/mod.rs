pub mod editor;
pub mod health;
pub mod surface;
pub mod virtual_server;

// Re-export all handlers for easy route registration
pub use editor::{
    close_document_handler, close_project_handler, open_project_handler, remove_overlay_handler,
    select_file_handler, set_overlay_handler, status_handler, trust_handler,
    update_document_handler,
};
pub use health::{health_handler, health_live_handler, metrics_handler};
pub use surface::surface_socket_handler;
pub use virtual_server::serve_preview;
