use std::env;

pub struct ServerConfig {
    pub bind_addr: String,
    pub model_path: String,
}

impl ServerConfig {
    pub fn from_env() -> Self {
        let port = env::var("PORT").unwrap_or_else(|_| "8765".to_string());
        let bind_addr = format!("0.0.0.0:{}", port);
        let model_path = env::var("MODEL_PATH")
            .unwrap_or_else(|_| "models/ct_screening_multitask.pt".to_string());
        Self {
            bind_addr,
            model_path,
        }
    }
}
