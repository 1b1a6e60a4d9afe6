//! HTTP API client for the chat server.
//!
//! Every endpoint answers with the `{code, message, data}` envelope; one
//! request path unwraps it. HTTP 401 is handled before the envelope is even
//! looked at: the session has expired, so the locally persisted identity is
//! cleared and the caller gets [`ApiError::SessionExpired`], distinct from a
//! business failure. Nothing here is fatal; every failure comes back typed.

use linnet_shared::{
    ApiError, ChatRecord, CreateGroupRequest, Envelope, GroupInfo, LoginRequest, LoginResponse,
    RegisterRequest, UpdateProfileRequest, UserInfo,
};
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::session::{ProfileUpdate, SessionStore};

/// REST client bound to one server and one session store.
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
    session: SessionStore,
}

impl ApiClient {
    /// Client with a cookie jar, for deployments using ambient session-cookie
    /// auth. `base_url` is the server origin, e.g. `http://localhost:8080`.
    pub fn new(base_url: impl Into<String>, session: SessionStore) -> Self {
        let client = Client::builder()
            .cookie_store(true)
            .build()
            .unwrap_or_else(|_| Client::new());
        Self::with_client(client, base_url, session)
    }

    pub fn with_client(client: Client, base_url: impl Into<String>, session: SessionStore) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            session,
        }
    }

    fn url(&self, path: &str) -> String {
        let base = self.base_url.trim_end_matches('/');
        let path = path.trim_start_matches('/');
        format!("{base}/{path}")
    }

    /// Send a request and apply the envelope contract.
    async fn execute<TRes: DeserializeOwned>(
        &self,
        rb: RequestBuilder,
    ) -> Result<Option<TRes>, ApiError> {
        let resp = rb
            .send()
            .await
            .map_err(|e| ApiError::Network(e.to_string()))?;
        let status = resp.status();
        let text = resp
            .text()
            .await
            .map_err(|e| ApiError::Network(format!("failed to read body: {e}")))?;

        if status == StatusCode::UNAUTHORIZED {
            // Session expiry, regardless of body shape: forced local logout.
            tracing::warn!("server answered 401, clearing persisted identity");
            self.session.logout();
            return Err(ApiError::SessionExpired);
        }
        if !status.is_success() {
            return Err(ApiError::Http {
                status: status.as_u16(),
                body: text,
            });
        }

        let envelope: Envelope<TRes> =
            serde_json::from_str(&text).map_err(|e| ApiError::Decode(e.to_string()))?;
        envelope.into_result()
    }

    async fn get_data<TRes: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<TRes, ApiError> {
        self.execute(self.client.get(self.url(path)).query(query))
            .await?
            .ok_or_else(missing_data)
    }

    async fn post_data<TReq: Serialize + ?Sized, TRes: DeserializeOwned>(
        &self,
        path: &str,
        body: &TReq,
    ) -> Result<TRes, ApiError> {
        self.execute(self.client.post(self.url(path)).json(body))
            .await?
            .ok_or_else(missing_data)
    }

    // --- Auth ---

    /// Register a new account. The server assigns the user id.
    pub async fn register(&self, request: &RegisterRequest) -> Result<(), ApiError> {
        self.execute::<serde_json::Value>(self.client.post(self.url("/auth/register")).json(request))
            .await
            .map(|_| ())
    }

    /// Log in and populate the session store with the returned identity.
    pub async fn login(&self, request: &LoginRequest) -> Result<LoginResponse, ApiError> {
        let response: LoginResponse = self.post_data("/auth/login", request).await?;
        self.session.login(&response);
        Ok(response)
    }

    /// Log out server-side. Local identity is cleared even when the server
    /// call fails; there is no session worth keeping at that point.
    pub async fn logout(&self) -> Result<(), ApiError> {
        let result = self
            .execute::<serde_json::Value>(self.client.post(self.url("/auth/logout")))
            .await;
        self.session.logout();
        match result {
            // 401 on logout means the job is already done.
            Err(ApiError::SessionExpired) => Ok(()),
            other => other.map(|_| ()),
        }
    }

    /// Push a partial profile change to the server, then mirror it into the
    /// session store on success.
    pub async fn update_profile(&self, update: &ProfileUpdate) -> Result<(), ApiError> {
        let Some(user_id) = self.session.user_id() else {
            return Err(ApiError::SessionExpired);
        };
        let request = UpdateProfileRequest {
            user_id,
            nickname: update.nickname.clone(),
            avatar: update.avatar.clone(),
            email: update.email.clone(),
        };
        self.execute::<serde_json::Value>(
            self.client.post(self.url("/auth/updateProfile")).json(&request),
        )
        .await?;
        self.session.update_profile(update);
        Ok(())
    }

    // --- Messages ---

    /// Direct-chat history between the logged-in user and `peer_id`.
    pub async fn chat_history(&self, peer_id: &str) -> Result<Vec<ChatRecord>, ApiError> {
        let Some(user_id) = self.session.user_id() else {
            return Err(ApiError::SessionExpired);
        };
        self.get_data(
            "/message/history",
            &[("fromUserId", user_id.as_str()), ("toUserId", peer_id)],
        )
        .await
    }

    pub async fn group_history(&self, group_id: &str) -> Result<Vec<ChatRecord>, ApiError> {
        self.get_data("/message/group/history", &[("groupId", group_id)])
            .await
    }

    pub async fn unread_messages(&self) -> Result<Vec<ChatRecord>, ApiError> {
        let Some(user_id) = self.session.user_id() else {
            return Err(ApiError::SessionExpired);
        };
        self.get_data("/message/unread", &[("userId", user_id.as_str())])
            .await
    }

    pub async fn mark_read(&self, message_id: &str) -> Result<(), ApiError> {
        self.execute::<serde_json::Value>(
            self.client
                .get(self.url("/message/read"))
                .query(&[("messageId", message_id)]),
        )
        .await
        .map(|_| ())
    }

    /// Mark everything `peer_id` sent to the logged-in user as read.
    pub async fn mark_conversation_read(&self, peer_id: &str) -> Result<(), ApiError> {
        let Some(user_id) = self.session.user_id() else {
            return Err(ApiError::SessionExpired);
        };
        self.execute::<serde_json::Value>(
            self.client
                .post(self.url("/message/batchRead"))
                .query(&[("fromUserId", peer_id), ("toUserId", user_id.as_str())]),
        )
        .await
        .map(|_| ())
    }

    pub async fn online_users(&self) -> Result<Vec<UserInfo>, ApiError> {
        self.get_data("/message/online/users", &[]).await
    }

    pub async fn is_online(&self, user_id: &str) -> Result<bool, ApiError> {
        self.get_data("/message/online/check", &[("userId", user_id)])
            .await
    }

    // --- Groups ---

    pub async fn create_group(&self, request: &CreateGroupRequest) -> Result<GroupInfo, ApiError> {
        self.post_data("/group/create", request).await
    }

    /// Groups the logged-in user belongs to (membership comes from the
    /// server-side session).
    pub async fn groups(&self) -> Result<Vec<GroupInfo>, ApiError> {
        self.get_data("/group/list", &[]).await
    }

    pub async fn group_members(&self, group_id: &str) -> Result<Vec<String>, ApiError> {
        self.get_data("/group/members", &[("groupId", group_id)])
            .await
    }
}

fn missing_data() -> ApiError {
    ApiError::Decode("envelope is missing its data field".into())
}
