pub mod chat_session;
pub mod image;
pub mod image_analysis;
pub mod metrics_manager;
pub mod model_client;
pub mod session_manager;
pub mod topic;
