//! HTTP gateway for the user-management REST API.
//!
//! Every endpoint speaks a `{success, data|message}` envelope. A non-success
//! envelope and a transport failure are treated identically by callers: the
//! operation did not take effect. No retries, no timeouts.

use crate::session::{User, UserPatch};
use serde::de::DeserializeOwned;
use serde::Deserialize;

/// A failed API call: HTTP status when one was received, and the server's
/// error message when the body carried one.
#[derive(Debug, Clone)]
pub struct ApiError {
    pub status: Option<u16>,
    pub message: String,
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.status {
            Some(code) => write!(f, "{} (HTTP {})", self.message, code),
            None => write!(f, "{}", self.message),
        }
    }
}

impl std::error::Error for ApiError {}

#[derive(Debug, Deserialize)]
pub struct LoginResponse {
    pub success: bool,
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub user: Option<User>,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct DataResponse<T> {
    pub success: bool,
    #[serde(default)]
    pub data: Option<T>,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct AckResponse {
    pub success: bool,
    #[serde(default)]
    pub message: Option<String>,
    /// Development convenience: some deployments echo the reset link back.
    #[serde(default)]
    pub dev_reset_link: Option<String>,
}

/// Body shape of an error response, parsed best-effort.
#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: Option<String>,
}

/// One operation per REST call. Trait so tests can swap in a mock gateway.
pub trait UserApi {
    /// Set or clear the bearer credential attached to subsequent requests.
    fn set_token(&mut self, token: Option<String>);

    fn login(&self, email: &str, password: &str) -> Result<(String, User), ApiError>;
    fn register(&self, name: &str, email: &str, password: &str) -> Result<(), ApiError>;
    fn get_user(&self, id: &str) -> Result<User, ApiError>;
    fn update_user(&self, id: &str, patch: &UserPatch) -> Result<User, ApiError>;
    fn delete_user(&self, id: &str) -> Result<(), ApiError>;
    fn list_users(&self) -> Result<Vec<User>, ApiError>;
    fn request_password_reset(&self, email: &str) -> Result<Option<String>, ApiError>;
    fn verify_reset_token(&self, token: &str, email: &str) -> Result<bool, ApiError>;
    fn reset_password(
        &self,
        email: &str,
        token: &str,
        new_password: &str,
        confirm_password: &str,
    ) -> Result<(), ApiError>;
}

pub struct HttpClient {
    base_url: String,
    token: Option<String>,
    agent: ureq::Agent,
}

impl HttpClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            token: None,
            agent: ureq::Agent::new(),
        }
    }

    fn request(&self, method: &str, path: &str) -> ureq::Request {
        let url = format!("{}{}", self.base_url, path);
        let mut req = self
            .agent
            .request(method, &url)
            .set("Content-Type", "application/json");
        if let Some(token) = &self.token {
            req = req.set("Authorization", &format!("Bearer {}", token));
        }
        req
    }

    fn recv<T: DeserializeOwned>(
        resp: Result<ureq::Response, ureq::Error>,
    ) -> Result<T, ApiError> {
        match resp {
            Ok(r) => r.into_json().map_err(|e| ApiError {
                status: None,
                message: format!("Malformed response: {}", e),
            }),
            Err(ureq::Error::Status(code, r)) => {
                let body = r.into_string().unwrap_or_default();
                Err(ApiError {
                    status: Some(code),
                    message: error_message(code, &body),
                })
            }
            Err(e) => Err(ApiError {
                status: None,
                message: format!("Request failed: {}", e),
            }),
        }
    }
}

/// Extract the server's `message` from an error body, falling back to a
/// generic string when the body is not the expected envelope.
fn error_message(code: u16, body: &str) -> String {
    serde_json::from_str::<ErrorBody>(body)
        .ok()
        .and_then(|b| b.message)
        .unwrap_or_else(|| format!("Request failed with status {}", code))
}

fn ensure_success(success: bool, message: Option<String>) -> Result<(), ApiError> {
    if success {
        Ok(())
    } else {
        Err(ApiError {
            status: None,
            message: message.unwrap_or_else(|| "Request was not successful".to_string()),
        })
    }
}

fn require<T>(value: Option<T>, what: &str) -> Result<T, ApiError> {
    value.ok_or_else(|| ApiError {
        status: None,
        message: format!("Response missing {}", what),
    })
}

impl UserApi for HttpClient {
    fn set_token(&mut self, token: Option<String>) {
        self.token = token;
    }

    fn login(&self, email: &str, password: &str) -> Result<(String, User), ApiError> {
        let resp = self
            .request("POST", "/users/login")
            .send_json(serde_json::json!({ "email": email, "password": password }));
        let body: LoginResponse = Self::recv(resp)?;
        ensure_success(body.success, body.message)?;
        Ok((require(body.token, "token")?, require(body.user, "user")?))
    }

    fn register(&self, name: &str, email: &str, password: &str) -> Result<(), ApiError> {
        let resp = self.request("POST", "/users/register").send_json(
            serde_json::json!({ "name": name, "email": email, "password": password }),
        );
        let body: AckResponse = Self::recv(resp)?;
        ensure_success(body.success, body.message)
    }

    fn get_user(&self, id: &str) -> Result<User, ApiError> {
        let resp = self.request("GET", &format!("/users/{}", id)).call();
        let body: DataResponse<User> = Self::recv(resp)?;
        ensure_success(body.success, body.message)?;
        require(body.data, "user record")
    }

    fn update_user(&self, id: &str, patch: &UserPatch) -> Result<User, ApiError> {
        let resp = self
            .request("PATCH", &format!("/users/{}", id))
            .send_json(serde_json::to_value(patch).map_err(|e| ApiError {
                status: None,
                message: format!("Failed to encode update: {}", e),
            })?);
        let body: DataResponse<User> = Self::recv(resp)?;
        ensure_success(body.success, body.message)?;
        require(body.data, "user record")
    }

    fn delete_user(&self, id: &str) -> Result<(), ApiError> {
        let resp = self.request("DELETE", &format!("/users/{}", id)).call();
        let body: AckResponse = Self::recv(resp)?;
        ensure_success(body.success, body.message)
    }

    fn list_users(&self) -> Result<Vec<User>, ApiError> {
        let resp = self.request("GET", "/users").call();
        let body: DataResponse<Vec<User>> = Self::recv(resp)?;
        ensure_success(body.success, body.message)?;
        require(body.data, "user list")
    }

    fn request_password_reset(&self, email: &str) -> Result<Option<String>, ApiError> {
        let resp = self
            .request("POST", "/users/forgot-password/request")
            .send_json(serde_json::json!({ "email": email }));
        let body: AckResponse = Self::recv(resp)?;
        ensure_success(body.success, body.message)?;
        Ok(body.dev_reset_link)
    }

    fn verify_reset_token(&self, token: &str, email: &str) -> Result<bool, ApiError> {
        let resp = self
            .request("GET", "/users/forgot-password/verify-token")
            .query("token", token)
            .query("email", email)
            .call();
        match resp {
            Ok(r) => {
                let body: AckResponse = r.into_json().map_err(|e| ApiError {
                    status: None,
                    message: format!("Malformed response: {}", e),
                })?;
                Ok(body.success)
            }
            // A rejected token is a definite answer, not a failure.
            Err(ureq::Error::Status(_, _)) => Ok(false),
            Err(e) => Err(ApiError {
                status: None,
                message: format!("Request failed: {}", e),
            }),
        }
    }

    fn reset_password(
        &self,
        email: &str,
        token: &str,
        new_password: &str,
        confirm_password: &str,
    ) -> Result<(), ApiError> {
        let resp = self
            .request("POST", "/users/forgot-password/reset")
            .send_json(serde_json::json!({
                "email": email,
                "token": token,
                "newPassword": new_password,
                "confirmPassword": confirm_password,
            }));
        let body: AckResponse = Self::recv(resp)?;
        ensure_success(body.success, body.message)
    }
}
