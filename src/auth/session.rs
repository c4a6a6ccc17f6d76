//! Credential session management.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::cloud::{AssumeRoleRequest, ClientFactory, Clients, ErrorKind, MfaToken};
use crate::error::{AuthError, Result, Stage, StackforgeError};

/// Lifetime requested for plain role credentials.
pub const ASSUME_ROLE_DURATION_SECS: i32 = 900;

/// Lifetime requested for MFA-gated role credentials.
pub const MFA_ASSUME_ROLE_DURATION_SECS: i32 = 3600;

/// Holds the client set every remote call goes through.
///
/// The session starts with the ambient credentials, which are kept as the
/// `original` client set for its whole lifetime. Assuming a role swaps the
/// `active` set wholesale; unassuming swaps it back.
pub struct Session {
    factory: Arc<dyn ClientFactory>,
    original: Clients,
    active: Clients,
    role_arn: Option<String>,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("role_arn", &self.role_arn)
            .finish_non_exhaustive()
    }
}

impl Session {
    /// Creates a session around the ambient client set.
    #[must_use]
    pub fn new(factory: Arc<dyn ClientFactory>, ambient: Clients) -> Self {
        Self {
            factory,
            original: ambient.clone(),
            active: ambient,
            role_arn: None,
        }
    }

    /// The client set currently in use.
    #[must_use]
    pub const fn clients(&self) -> &Clients {
        &self.active
    }

    /// The role most recently assumed, if any.
    #[must_use]
    pub fn role_arn(&self) -> Option<&str> {
        self.role_arn.as_deref()
    }

    /// Assumes `role_arn` and makes its credentials active.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::AssumeRoleFailed`] if the caller identity lookup
    /// or the assumption itself fails.
    pub async fn assume_role(&mut self, role_arn: &str) -> Result<()> {
        self.assume(role_arn, None, ASSUME_ROLE_DURATION_SECS).await
    }

    /// Assumes `role_arn` with an MFA token.
    ///
    /// When `serial` is `None`, the first MFA device registered to the caller
    /// is used.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::MfaDeviceNotFound`] if the caller has no device,
    /// [`AuthError::AccessDenied`] if it may not list them, and
    /// [`AuthError::AssumeRoleFailed`] if the assumption fails.
    pub async fn assume_role_with_mfa(
        &mut self,
        role_arn: &str,
        token: &str,
        serial: Option<&str>,
    ) -> Result<()> {
        let serial = match serial.filter(|s| !s.is_empty()) {
            Some(serial) => serial.to_string(),
            None => self.mfa_serial().await?,
        };

        let mfa = MfaToken {
            serial,
            code: token.to_string(),
        };
        self.assume(role_arn, Some(mfa), MFA_ASSUME_ROLE_DURATION_SECS)
            .await
    }

    /// Restores the ambient credentials.
    pub fn unassume_all(&mut self) {
        debug!("Restoring original credentials");
        self.active = self.original.clone();
    }

    /// Recovers from an expired-token failure.
    ///
    /// If `err` reports expired credentials and a role has been assumed, the
    /// session unassumes and assumes that role again, and the caller may retry
    /// the failed call. Any other error, or a failed re-assumption, is
    /// returned unchanged.
    ///
    /// # Errors
    ///
    /// Returns `err` when the session cannot recover from it.
    pub async fn rotate_on_expiry(&mut self, err: StackforgeError) -> Result<()> {
        if !err.is_expired_token() {
            return Err(err);
        }
        let Some(role_arn) = self.role_arn.clone() else {
            return Err(err);
        };

        info!("Credentials expired, assuming {role_arn} again");
        self.unassume_all();
        if let Err(rotation) = self.assume_role(&role_arn).await {
            warn!("Failed to rotate credentials: {rotation}");
            return Err(err);
        }
        Ok(())
    }

    /// Runs `operation` with the active clients, rotating credentials and
    /// retrying for as long as it fails with an expired token.
    ///
    /// # Errors
    ///
    /// Returns the first error that is not recoverable by rotation.
    pub async fn retry_on_expiry<T, F, Fut>(&mut self, mut operation: F) -> Result<T>
    where
        F: FnMut(Clients) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        loop {
            match operation(self.active.clone()).await {
                Ok(value) => return Ok(value),
                Err(err) => self.rotate_on_expiry(err).await?,
            }
        }
    }

    async fn assume(&mut self, role_arn: &str, mfa: Option<MfaToken>, duration_secs: i32) -> Result<()> {
        let failed = |source| {
            StackforgeError::Auth(AuthError::AssumeRoleFailed {
                role_arn: role_arn.to_string(),
                source,
            })
        };

        let identity = self
            .active
            .sts
            .get_caller_identity()
            .await
            .map_err(failed)?;

        let request = AssumeRoleRequest {
            role_arn: role_arn.to_string(),
            session_name: identity.session_name().to_string(),
            duration_secs,
            mfa,
        };
        let credentials = self.active.sts.assume_role(&request).await.map_err(failed)?;

        info!("Assumed role {role_arn} as session {}", request.session_name);
        self.active = self.factory.from_credentials(&credentials);
        self.role_arn = Some(role_arn.to_string());
        Ok(())
    }

    async fn mfa_serial(&self) -> Result<String> {
        let devices = self.active.iam.list_mfa_devices().await.map_err(|e| {
            if e.kind() == ErrorKind::AccessDenied {
                StackforgeError::Auth(AuthError::AccessDenied)
            } else {
                StackforgeError::remote(Stage::MfaLookup, e)
            }
        })?;

        devices
            .into_iter()
            .next()
            .ok_or(StackforgeError::Auth(AuthError::MfaDeviceNotFound))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cloud::fake::{FakeCloudFormation, FakeFactory};
    use crate::cloud::{
        CallerIdentity, MockIamApi, MockStsApi, ServiceError, TemporaryCredentials,
    };
    use std::sync::atomic::{AtomicUsize, Ordering};

    const ROLE: &str = "arn:aws:iam::123456789012:role/deployer";

    fn identity() -> CallerIdentity {
        CallerIdentity {
            account: String::from("123456789012"),
            arn: String::from("arn:aws:iam::123456789012:user/jdoe"),
        }
    }

    fn credentials() -> TemporaryCredentials {
        TemporaryCredentials {
            access_key_id: String::from("ASIAEXAMPLE"),
            secret_access_key: String::from("secret"),
            session_token: String::from("token"),
            expiration: None,
        }
    }

    fn clients_with(sts: MockStsApi, iam: MockIamApi) -> Clients {
        Clients::new(
            Arc::new(FakeCloudFormation::new()),
            Arc::new(sts),
            Arc::new(iam),
        )
    }

    /// STS mock expecting `times` plain assumptions of [`ROLE`].
    fn sts_assuming(times: usize) -> MockStsApi {
        let mut sts = MockStsApi::new();
        sts.expect_get_caller_identity()
            .times(times)
            .returning(|| Ok(identity()));
        sts.expect_assume_role()
            .withf(|r| {
                r.role_arn == ROLE
                    && r.session_name == "jdoe"
                    && r.duration_secs == ASSUME_ROLE_DURATION_SECS
                    && r.mfa.is_none()
            })
            .times(times)
            .returning(|_| Ok(credentials()));
        sts
    }

    fn new_session(original: Clients) -> (Session, Arc<FakeFactory>, Clients) {
        let assumed = clients_with(MockStsApi::new(), MockIamApi::new());
        let factory = Arc::new(FakeFactory::new(assumed.clone()));
        (Session::new(factory.clone(), original), factory, assumed)
    }

    #[tokio::test]
    async fn test_assume_and_unassume() {
        let original = clients_with(sts_assuming(1), MockIamApi::new());
        let (mut session, factory, assumed) = new_session(original.clone());

        session.assume_role(ROLE).await.expect("assume");
        assert_eq!(factory.issued(), 1);
        assert!(Arc::ptr_eq(&session.clients().sts, &assumed.sts));
        assert_eq!(session.role_arn(), Some(ROLE));

        session.unassume_all();
        assert!(Arc::ptr_eq(&session.clients().sts, &original.sts));
    }

    #[tokio::test]
    async fn test_assume_role_failure() {
        let mut sts = MockStsApi::new();
        sts.expect_get_caller_identity().returning(|| Ok(identity()));
        sts.expect_assume_role()
            .returning(|_| Err(ServiceError::new("AccessDenied", "not authorized to assume")));
        let (mut session, factory, _) = new_session(clients_with(sts, MockIamApi::new()));

        let err = session.assume_role(ROLE).await.expect_err("should fail");
        assert!(matches!(
            err,
            StackforgeError::Auth(AuthError::AssumeRoleFailed { ref role_arn, .. }) if role_arn == ROLE
        ));
        assert_eq!(factory.issued(), 0);
        assert_eq!(session.role_arn(), None);
    }

    #[tokio::test]
    async fn test_assume_role_with_mfa_detects_serial() {
        let mut sts = MockStsApi::new();
        sts.expect_get_caller_identity().returning(|| Ok(identity()));
        sts.expect_assume_role()
            .withf(|r| {
                r.duration_secs == MFA_ASSUME_ROLE_DURATION_SECS
                    && r.mfa
                        == Some(MfaToken {
                            serial: String::from("arn:aws:iam::123456789012:mfa/jdoe"),
                            code: String::from("123456"),
                        })
            })
            .times(1)
            .returning(|_| Ok(credentials()));

        let mut iam = MockIamApi::new();
        iam.expect_list_mfa_devices().times(1).returning(|| {
            Ok(vec![
                String::from("arn:aws:iam::123456789012:mfa/jdoe"),
                String::from("arn:aws:iam::123456789012:mfa/backup"),
            ])
        });

        let (mut session, factory, _) = new_session(clients_with(sts, iam));
        session
            .assume_role_with_mfa(ROLE, "123456", None)
            .await
            .expect("assume with mfa");
        assert_eq!(factory.issued(), 1);
    }

    #[tokio::test]
    async fn test_assume_role_with_mfa_explicit_serial_skips_lookup() {
        let mut sts = MockStsApi::new();
        sts.expect_get_caller_identity().returning(|| Ok(identity()));
        sts.expect_assume_role()
            .withf(|r| r.mfa.as_ref().is_some_and(|m| m.serial == "GAHT12345678"))
            .times(1)
            .returning(|_| Ok(credentials()));
        let mut iam = MockIamApi::new();
        iam.expect_list_mfa_devices().never();

        let (mut session, _, _) = new_session(clients_with(sts, iam));
        session
            .assume_role_with_mfa(ROLE, "123456", Some("GAHT12345678"))
            .await
            .expect("assume with mfa");
    }

    #[tokio::test]
    async fn test_mfa_device_errors() {
        let mut iam = MockIamApi::new();
        iam.expect_list_mfa_devices().returning(|| Ok(vec![]));
        let (mut session, _, _) = new_session(clients_with(MockStsApi::new(), iam));
        let err = session
            .assume_role_with_mfa(ROLE, "123456", None)
            .await
            .expect_err("no device");
        assert!(matches!(err, StackforgeError::Auth(AuthError::MfaDeviceNotFound)));

        let mut iam = MockIamApi::new();
        iam.expect_list_mfa_devices()
            .returning(|| Err(ServiceError::new("AccessDenied", "not authorized")));
        let (mut session, _, _) = new_session(clients_with(MockStsApi::new(), iam));
        let err = session
            .assume_role_with_mfa(ROLE, "123456", None)
            .await
            .expect_err("denied");
        assert!(matches!(err, StackforgeError::Auth(AuthError::AccessDenied)));
    }

    #[tokio::test]
    async fn test_rotate_ignores_other_errors() {
        let (mut session, factory, _) = new_session(clients_with(MockStsApi::new(), MockIamApi::new()));

        let err = StackforgeError::remote(Stage::Describe, ServiceError::new("Throttling", "Rate exceeded"));
        let returned = session.rotate_on_expiry(err).await.expect_err("not recoverable");
        assert!(matches!(returned, StackforgeError::Remote { stage: Stage::Describe, .. }));

        // expired, but no role to assume again
        let expired = StackforgeError::remote(Stage::Describe, ServiceError::new("ExpiredToken", "expired"));
        assert!(session.rotate_on_expiry(expired).await.is_err());
        assert_eq!(factory.issued(), 0);
    }

    #[tokio::test]
    async fn test_retry_on_expiry_rotates_once() {
        // one assumption up front, one for the rotation
        let original = clients_with(sts_assuming(2), MockIamApi::new());
        let (mut session, factory, _) = new_session(original);
        session.assume_role(ROLE).await.expect("assume");

        let attempts = AtomicUsize::new(0);
        let value = session
            .retry_on_expiry(|_clients| {
                let attempt = attempts.fetch_add(1, Ordering::SeqCst);
                async move {
                    if attempt == 0 {
                        Err(StackforgeError::remote(
                            Stage::Describe,
                            ServiceError::new("ExpiredToken", "The security token included in the request is expired"),
                        ))
                    } else {
                        Ok("CREATE_COMPLETE")
                    }
                }
            })
            .await
            .expect("retried");

        assert_eq!(value, "CREATE_COMPLETE");
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
        assert_eq!(factory.issued(), 2);
    }

    #[tokio::test]
    async fn test_retry_on_expiry_surfaces_failed_rotation() {
        let mut sts = MockStsApi::new();
        let mut lookups = 0;
        // the lookup during rotation is rejected
        sts.expect_get_caller_identity().times(2).returning(move || {
            lookups += 1;
            if lookups == 1 {
                Ok(identity())
            } else {
                Err(ServiceError::new("ExpiredToken", "expired"))
            }
        });
        sts.expect_assume_role().times(1).returning(|_| Ok(credentials()));
        let (mut session, _, _) = new_session(clients_with(sts, MockIamApi::new()));
        session.assume_role(ROLE).await.expect("assume");

        let err = session
            .retry_on_expiry(|_clients| async {
                Err::<(), _>(StackforgeError::remote(
                    Stage::Events,
                    ServiceError::new("ExpiredToken", "expired"),
                ))
            })
            .await
            .expect_err("rotation failed");
        assert!(matches!(err, StackforgeError::Remote { stage: Stage::Events, .. }));
    }
}
