use crate::{
    auth,
    error::{CoreError, CoreResult},
    models::{NewUser, User, UserId, UserRef},
    store::Store,
};
use std::sync::Arc;

const MIN_PASSWORD_LEN: usize = 4;
const MAX_NICKNAME_LEN: usize = 30;

#[derive(Clone)]
pub struct AccountDirectory {
    store: Arc<dyn Store>,
}

fn validate_password(password: &str) -> CoreResult<()> {
    if password.trim().chars().count() < MIN_PASSWORD_LEN {
        return Err(CoreError::invalid_input(format!(
            "password must be at least {MIN_PASSWORD_LEN} characters"
        )));
    }
    Ok(())
}

fn validate_nickname(nickname: &str) -> CoreResult<()> {
    if nickname.is_empty() || nickname.chars().count() > MAX_NICKNAME_LEN {
        return Err(CoreError::invalid_input(format!(
            "nickname must be 1 to {MAX_NICKNAME_LEN} characters"
        )));
    }
    Ok(())
}

fn validate_signup(email: &str, nickname: &str, password: &str) -> CoreResult<()> {
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && domain.contains('.') => {}
        _ => return Err(CoreError::invalid_input("email is not valid")),
    }
    validate_nickname(nickname)?;
    validate_password(password)
}

impl AccountDirectory {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    #[tracing::instrument(skip(self, password))]
    pub async fn signup(&self, email: &str, nickname: &str, password: &str) -> CoreResult<User> {
        let (email, nickname) = (email.trim(), nickname.trim());
        validate_signup(email, nickname, password)?;

        let user = self
            .store
            .insert_user(NewUser {
                email: email.to_string(),
                nickname: nickname.to_string(),
                password_hash: auth::hash_password(password)?,
            })
            .await?;
        tracing::info!(user_id = user.id, "account created");
        Ok(user)
    }

    #[tracing::instrument(skip(self, password))]
    pub async fn authenticate(&self, email: &str, password: &str) -> CoreResult<User> {
        match self.store.find_user_by_email(email.trim()).await? {
            Some(user) if !user.is_deleted && auth::verify_password(password, &user.password_hash)? => {
                Ok(user)
            }
            _ => Err(CoreError::Unauthorized("invalid email or password".into())),
        }
    }

    #[tracing::instrument(skip(self, current, new))]
    pub async fn change_password(&self, user_id: UserId, current: &str, new: &str) -> CoreResult<()> {
        let user = self.require(user_id).await?;
        if !auth::verify_password(current, &user.password_hash)? {
            return Err(CoreError::Unauthorized("current password does not match".into()));
        }
        validate_password(new)?;

        self.store
            .set_password_hash(user_id, auth::hash_password(new)?)
            .await?;
        tracing::info!(user_id, "password changed");
        Ok(())
    }

    #[tracing::instrument(skip(self))]
    pub async fn update_profile(&self, user_id: UserId, nickname: &str) -> CoreResult<UserRef> {
        let nickname = nickname.trim();
        validate_nickname(nickname)?;

        let user = self.store.set_nickname(user_id, nickname.to_string()).await?;
        tracing::info!(user_id, "profile updated");
        Ok(UserRef::from(&user))
    }

    pub async fn exists(&self, user_id: UserId) -> CoreResult<bool> {
        Ok(self
            .store
            .find_user(user_id)
            .await?
            .map_or(false, |u| !u.is_deleted))
    }

    pub async fn get(&self, user_id: UserId) -> CoreResult<UserRef> {
        self.require(user_id).await.map(|u| UserRef::from(&u))
    }

    /// The live account, or `NotFound` when it is missing or deleted.
    pub(crate) async fn require(&self, user_id: UserId) -> CoreResult<User> {
        match self.store.find_user(user_id).await? {
            Some(user) if !user.is_deleted => Ok(user),
            _ => Err(CoreError::not_found("user not found")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signup_input_is_checked() {
        assert!(validate_signup("dancer@groove.io", "popper", "1234").is_ok());
        assert!(matches!(
            validate_signup("dancer", "popper", "1234"),
            Err(CoreError::InvalidInput(_))
        ));
        assert!(matches!(
            validate_signup("dancer@groove.io", "", "1234"),
            Err(CoreError::InvalidInput(_))
        ));
        assert!(matches!(
            validate_signup("dancer@groove.io", "popper", "123"),
            Err(CoreError::InvalidInput(_))
        ));
    }
}
