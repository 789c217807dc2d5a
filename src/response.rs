use actix_web::http::StatusCode;
use serde::Serialize;

/// Envelope shared by every JSON response the service emits.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub status: u16,
    pub message: String,
    pub data: T,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn new(status: StatusCode, message: impl Into<String>, data: T) -> Self {
        Self {
            status: status.as_u16(),
            message: message.into(),
            data,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_envelope_shape() {
        let body = ApiResponse::new(StatusCode::OK, "server up", "hello");
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["status"], 200);
        assert_eq!(json["message"], "server up");
        assert_eq!(json["data"], "hello");
    }
}
