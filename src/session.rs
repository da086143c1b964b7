// Login, logout and the stored session user

use chrono::Utc;

use crate::auth::{CredentialPair, LoginRequest, LoginResponse, SessionUser};
use crate::error::Result;
use crate::http_client::ApiClient;
use crate::notify::SESSION_EXPIRED_KEY;
use crate::request::ApiRequest;

impl ApiClient {
    /// Exchange email and password for a session
    ///
    /// A rejected login is returned as-is; it never triggers a token refresh.
    pub async fn login(&self, email: &str, password: &str) -> Result<SessionUser> {
        tracing::info!(email = email, "Logging in");

        let request = ApiRequest::post(self.settings.login_path.clone()).json(&LoginRequest {
            email: email.to_string(),
            password: password.to_string(),
        })?;

        let response = self.dispatch(&request, None).await?;
        let data: LoginResponse = response.json()?;

        let user = SessionUser {
            id: data.user.id,
            email: data.user.email,
            nickname: data.user.nickname,
            logged_in_at: Utc::now(),
        };

        self.credentials.save_session(
            &CredentialPair {
                access_token: data.access_token,
                refresh_token: data.refresh_token,
            },
            &user,
        )?;

        // A fresh login ends any expiry episode still on screen
        self.redirector.cancel_pending();
        self.notifications.dismiss(SESSION_EXPIRED_KEY);

        tracing::info!(user_id = user.id, "Logged in");
        Ok(user)
    }

    /// Forget the stored session
    pub fn logout(&self) -> Result<()> {
        self.credentials.clear()?;
        tracing::info!("Logged out");
        Ok(())
    }

    /// User of the stored session, if logged in
    pub fn current_user(&self) -> Result<Option<SessionUser>> {
        Ok(self.credentials.user()?)
    }
}
