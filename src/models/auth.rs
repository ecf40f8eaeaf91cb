// src/models/auth.rs
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,  // Subject (user id)
    #[serde(default)]
    pub email: Option<String>,
    pub exp: usize,   // Expiration time
    pub iat: usize,   // Issued at
}
