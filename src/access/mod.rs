//! Authentication and access control
//!
//! Ticket login installs a session (cookie + CSRF token) into the client;
//! permission listing lets callers probe what a principal may touch
//! before attempting best-effort reads.

use virtlink_api::access::{
    Domain, PasswordRequest, Permissions, PermissionsOptions, Session, TicketRequest,
};

use crate::client::transport::Method;
use crate::client::{ApiClient, ApiError};

/// Login credentials for ticket exchange.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub username: String,
    pub password: String,
    pub otp: Option<String>,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
            otp: None,
        }
    }
}

impl ApiClient {
    /// Exchange credentials for a session ticket and install it for
    /// subsequent requests.
    pub fn ticket(&self, credentials: &Credentials) -> Result<Session, ApiError> {
        let request = TicketRequest {
            username: credentials.username.clone(),
            password: credentials.password.clone(),
            realm: None,
            otp: credentials.otp.clone(),
        };
        let session: Session = self.post("/access/ticket", &request)?;
        self.set_session(&session);
        Ok(session)
    }

    /// Effective permissions of the calling principal, optionally scoped
    /// to one ACL path or (with user-modify privileges) another user.
    pub fn permissions(
        &self,
        options: Option<&PermissionsOptions>,
    ) -> Result<Permissions, ApiError> {
        let mut query = Vec::new();
        if let Some(options) = options {
            if let Some(path) = &options.path {
                query.push(format!("path={path}"));
            }
            if let Some(user_id) = &options.user_id {
                query.push(format!("userid={user_id}"));
            }
        }
        let path = if query.is_empty() {
            "/access/permissions".to_string()
        } else {
            format!("/access/permissions?{}", query.join("&"))
        };
        self.get(&path)
    }

    /// Configured authentication realms.
    pub fn domains(&self) -> Result<Vec<Domain>, ApiError> {
        self.get("/access/domains")
    }

    /// One realm's configuration. The endpoint omits the realm name from
    /// the body; it is filled back in from the request.
    pub fn domain(&self, realm: &str) -> Result<Domain, ApiError> {
        let mut domain: Domain = self.get(&format!("/access/domains/{realm}"))?;
        domain.realm = realm.to_string();
        Ok(domain)
    }

    /// Change a user's password.
    pub fn password(&self, user_id: &str, password: &str) -> Result<(), ApiError> {
        let body = PasswordRequest {
            userid: user_id.to_string(),
            password: password.to_string(),
        };
        self.request_optional::<serde_json::Value>(
            Method::Put,
            "/access/password",
            Some(
                serde_json::to_value(&body)
                    .map_err(|e| ApiError::Decode(format!("request encode: {e}")))?,
            ),
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::transport::{MockTransport, Transport};
    use std::sync::Arc;
    use virtlink_api::access::IntOrBool;

    fn mock_pair() -> (Arc<MockTransport>, Arc<ApiClient>) {
        let transport = Arc::new(MockTransport::new());
        let client = Arc::new(ApiClient::new(transport.clone() as Arc<dyn Transport>));
        (transport, client)
    }

    #[test]
    fn test_ticket_installs_session() {
        let (transport, client) = mock_pair();
        let session = client
            .ticket(&Credentials::new("root@pam", "1234"))
            .unwrap();

        assert_eq!(session.username, "root@pam");
        assert_eq!(session.cluster_name.as_deref(), Some("lab"));

        // subsequent reads carry the ticket cookie
        let _: Vec<virtlink_api::cluster::ClusterStatusEntry> =
            client.get("/cluster/status").unwrap();
        let headers = transport.cluster().last_request_headers();
        assert!(headers
            .iter()
            .any(|(name, value)| name == "Cookie" && value.contains(&session.ticket)));
    }

    #[test]
    fn test_ticket_rejects_missing_password() {
        let (_, client) = mock_pair();
        let error = client
            .ticket(&Credentials {
                username: "root@pam".to_string(),
                password: String::new(),
                otp: None,
            })
            .unwrap_err();
        // 401 from the ticket endpoint is an authorization failure
        assert!(error.is_not_authorized() || matches!(error, ApiError::Api { .. }));
    }

    #[test]
    fn test_permissions_unscoped_and_scoped() {
        let (_, client) = mock_pair();

        let all = client.permissions(None).unwrap();
        assert_eq!(all["/"]["Datastore.Allocate"], IntOrBool(true));

        let scoped = client
            .permissions(Some(&PermissionsOptions {
                path: Some("/vms/103".to_string()),
                user_id: None,
            }))
            .unwrap();
        assert_eq!(scoped["/vms/103"]["permission"], IntOrBool(true));
    }

    #[test]
    fn test_domains_and_single_domain() {
        let (_, client) = mock_pair();

        let domains = client.domains().unwrap();
        assert_eq!(domains.len(), 3);

        let domain = client.domain("ldap-main").unwrap();
        assert_eq!(domain.realm, "ldap-main");
        assert_eq!(domain.kind.as_deref(), Some("ldap"));
    }

    #[test]
    fn test_password_change_acknowledges_without_payload() {
        let (_, client) = mock_pair();
        client.password("user@vl", "hunter2").unwrap();
    }
}
