use std::sync::Arc;

use tracing::{debug, info, instrument, warn};

use shared_config::{AppConfig, BootstrapAdmin};
use shared_database::store::{NewUser, ProfileChanges, USER_NOT_FOUND};
use shared_database::Store;
use shared_models::auth::{AuthPayload, Role, User};
use shared_models::error::AppError;
use shared_utils::jwt::issue_token;
use shared_utils::password::{hash_password, verify_dummy, verify_password};
use shared_utils::AppState;

use crate::models::{
    ChangePasswordRequest, LoginRequest, ProfileResponse, RegisterRequest, UpdateProfileRequest,
};

const INVALID_CREDENTIALS: &str = "Invalid email or password";

pub struct AuthService {
    config: Arc<AppConfig>,
    store: Arc<dyn Store>,
}

impl AuthService {
    pub fn new(state: &AppState) -> Self {
        Self {
            config: state.config.clone(),
            store: state.store.clone(),
        }
    }

    fn sign(&self, user: &User) -> Result<String, AppError> {
        issue_token(user.id, user.role, &self.config.jwt_secret, self.config.jwt_expires_in)
    }

    #[instrument(skip(self, request), fields(username = %request.username))]
    pub async fn register(&self, request: RegisterRequest) -> Result<AuthPayload, AppError> {
        let password_hash = hash_password(&request.password)?;

        let user = self
            .store
            .create_user(NewUser {
                username: request.username.trim().to_string(),
                email: request.email,
                password_hash,
                role: request.role.unwrap_or(Role::Patient),
                is_active: true,
            })
            .await?;

        info!("Registered user {} as {}", user.id, user.role);
        let token = self.sign(&user)?;
        Ok(AuthPayload { user, token })
    }

    /// Unknown email, wrong password and deactivated account all fail the same way.
    #[instrument(skip(self, request))]
    pub async fn login(&self, request: LoginRequest) -> Result<AuthPayload, AppError> {
        let Some(user) = self.store.find_user_by_email(&request.email).await? else {
            verify_dummy(&request.password);
            debug!("Login attempt for unknown email");
            return Err(AppError::Unauthorized(INVALID_CREDENTIALS.to_string()));
        };

        let password_ok = verify_password(&request.password, &user.password_hash).unwrap_or(false);
        if !password_ok || !user.is_active {
            warn!("Rejected login for user {}", user.id);
            return Err(AppError::Unauthorized(INVALID_CREDENTIALS.to_string()));
        }

        debug!("User {} logged in", user.id);
        let token = self.sign(&user)?;
        Ok(AuthPayload { user, token })
    }

    pub async fn profile(&self, user_id: i64) -> Result<ProfileResponse, AppError> {
        let user = self
            .store
            .find_user_by_id(user_id)
            .await?
            .ok_or_else(|| AppError::NotFound(USER_NOT_FOUND.to_string()))?;

        let staff_info = if user.role.is_staff() {
            self.store.find_staff_by_user(user.id).await?
        } else {
            None
        };

        Ok(ProfileResponse { user, staff_info })
    }

    pub async fn update_profile(
        &self,
        user_id: i64,
        request: UpdateProfileRequest,
    ) -> Result<User, AppError> {
        let changes = ProfileChanges {
            username: request.username.map(|username| username.trim().to_string()),
            email: request.email,
        };

        Ok(self.store.update_user_profile(user_id, changes).await?)
    }

    #[instrument(skip(self, request))]
    pub async fn change_password(
        &self,
        user_id: i64,
        request: ChangePasswordRequest,
    ) -> Result<(), AppError> {
        let user = self
            .store
            .find_user_by_id(user_id)
            .await?
            .ok_or_else(|| AppError::NotFound(USER_NOT_FOUND.to_string()))?;

        if !verify_password(&request.current_password, &user.password_hash).unwrap_or(false) {
            return Err(AppError::Unauthorized("Current password is incorrect".to_string()));
        }

        let password_hash = hash_password(&request.new_password)?;
        self.store.update_password(user_id, password_hash).await?;
        info!("Password changed for user {}", user_id);
        Ok(())
    }
}

/// Creates the configured admin account unless its email is already registered.
#[instrument(skip(store, admin), fields(email = %admin.email))]
pub async fn ensure_bootstrap_admin(
    store: &dyn Store,
    admin: &BootstrapAdmin,
) -> Result<Option<User>, AppError> {
    if store.find_user_by_email(&admin.email).await?.is_some() {
        debug!("Bootstrap admin already present");
        return Ok(None);
    }

    let user = store
        .create_user(NewUser {
            username: admin.username.clone(),
            email: admin.email.clone(),
            password_hash: hash_password(&admin.password)?,
            role: Role::Admin,
            is_active: true,
        })
        .await?;

    info!("Created bootstrap admin {}", user.id);
    Ok(Some(user))
}
