//! Account reads and edits for the authenticated caller

use std::sync::Arc;

use common::{
    error::{AccountError, AccountResult, StoreError},
    upload::{MediaUploader, StagedFile},
    users::{ImageSlot, PublicUser, UserStore},
    validation::{require_fields, validate_email},
};
use tracing::{error, info, warn};
use uuid::Uuid;

#[derive(Clone)]
pub struct AccountService {
    users: Arc<dyn UserStore>,
    uploader: Arc<dyn MediaUploader>,
}

impl AccountService {
    pub fn new(users: Arc<dyn UserStore>, uploader: Arc<dyn MediaUploader>) -> Self {
        Self { users, uploader }
    }

    /// Sanitized view of the caller, re-read from storage
    pub async fn current_user(&self, user_id: Uuid) -> AccountResult<PublicUser> {
        self.users
            .find_by_id(user_id)
            .await
            .map_err(|e| {
                error!("Failed to load user {}: {}", user_id, e);
                AccountError::internal()
            })?
            .map(|user| user.to_public())
            .ok_or_else(|| AccountError::unauthorized("Invalid access token"))
    }

    pub async fn update_account_details(
        &self,
        user_id: Uuid,
        full_name: &str,
        email: &str,
    ) -> AccountResult<PublicUser> {
        require_fields(&[full_name, email])?;
        let email = email.trim();
        validate_email(email)?;

        let user = self
            .users
            .update_details(user_id, full_name.trim(), email)
            .await
            .map_err(|e| match e {
                StoreError::Conflict(_) => AccountError::conflict("Email is already in use"),
                other => {
                    error!("Failed to update user {}: {}", user_id, other);
                    AccountError::internal()
                }
            })?
            .ok_or_else(|| AccountError::unauthorized("Invalid access token"))?;

        info!("Updated account details for user {}", user_id);
        Ok(user.to_public())
    }

    /// Upload `file` and store its URL in `slot`
    pub async fn update_image(
        &self,
        user_id: Uuid,
        slot: ImageSlot,
        file: Option<StagedFile>,
    ) -> AccountResult<PublicUser> {
        let label = match slot {
            ImageSlot::Avatar => "avatar",
            ImageSlot::CoverImage => "cover image",
        };
        let file = file.ok_or_else(|| {
            AccountError::bad_request(match slot {
                ImageSlot::Avatar => "Avatar file is missing",
                ImageSlot::CoverImage => "Cover image file is missing",
            })
        })?;

        let media = self.uploader.upload(file.path()).await.map_err(|e| {
            warn!("Failed to upload {} for user {}: {}", label, user_id, e);
            AccountError::bad_request(format!("Error while uploading {}", label))
        })?;

        let user = self
            .users
            .update_image(user_id, slot, &media.url)
            .await
            .map_err(|e| {
                error!("Failed to store {} for user {}: {}", label, user_id, e);
                AccountError::internal()
            })?
            .ok_or_else(|| AccountError::unauthorized("Invalid access token"))?;

        info!("Updated {} for user {}", label, user_id);
        Ok(user.to_public())
    }

    pub async fn update_avatar(
        &self,
        user_id: Uuid,
        file: Option<StagedFile>,
    ) -> AccountResult<PublicUser> {
        self.update_image(user_id, ImageSlot::Avatar, file).await
    }

    pub async fn update_cover_image(
        &self,
        user_id: Uuid,
        file: Option<StagedFile>,
    ) -> AccountResult<PublicUser> {
        self.update_image(user_id, ImageSlot::CoverImage, file).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::mock::{MemoryUserStore, StaticUploader};
    use common::users::NewUser;

    struct Fixture {
        service: AccountService,
        users: MemoryUserStore,
        uploader: StaticUploader,
    }

    impl Fixture {
        fn new() -> Self {
            let users = MemoryUserStore::new();
            let uploader = StaticUploader::new("https://cdn.example.com");
            Self {
                service: AccountService::new(Arc::new(users.clone()), Arc::new(uploader.clone())),
                users,
                uploader,
            }
        }

        async fn user(&self, username: &str) -> PublicUser {
            self.users
                .create(NewUser {
                    username: username.to_string(),
                    email: format!("{}@example.com", username),
                    full_name: "Someone".to_string(),
                    avatar: "https://cdn.example.com/old.png".to_string(),
                    cover_image: String::new(),
                    password_hash: "plain$secret".to_string(),
                })
                .await
                .unwrap()
                .to_public()
        }
    }

    async fn staged(name: &str) -> StagedFile {
        let dir = std::env::temp_dir().join("account-tests");
        StagedFile::write(&dir, Some(name), b"bytes").await.unwrap()
    }

    #[tokio::test]
    async fn test_current_user() {
        let f = Fixture::new();
        let alice = f.user("alice").await;

        assert_eq!(f.service.current_user(alice.id).await.unwrap().id, alice.id);
        assert!(matches!(
            f.service.current_user(Uuid::new_v4()).await,
            Err(AccountError::Unauthorized(_))
        ));
    }

    #[tokio::test]
    async fn test_update_account_details() {
        let f = Fixture::new();
        let alice = f.user("alice").await;

        let updated = f
            .service
            .update_account_details(alice.id, " Alice Liddell ", "alice@wonderland.org")
            .await
            .unwrap();

        assert_eq!(updated.full_name, "Alice Liddell");
        assert_eq!(updated.email, "alice@wonderland.org");
    }

    #[tokio::test]
    async fn test_update_account_details_validation() {
        let f = Fixture::new();
        let alice = f.user("alice").await;
        f.user("bob").await;

        assert_eq!(
            f.service.update_account_details(alice.id, "", "a@b.com").await,
            Err(AccountError::bad_request("All fields are required"))
        );
        assert!(matches!(
            f.service
                .update_account_details(alice.id, "Alice", "not-an-email")
                .await,
            Err(AccountError::BadRequest(_))
        ));
        assert_eq!(
            f.service
                .update_account_details(alice.id, "Alice", "BOB@example.com")
                .await,
            Err(AccountError::conflict("Email is already in use"))
        );
    }

    #[tokio::test]
    async fn test_update_avatar_and_cover_image() {
        let f = Fixture::new();
        let alice = f.user("alice").await;

        let updated = f
            .service
            .update_avatar(alice.id, Some(staged("new.png").await))
            .await
            .unwrap();
        assert!(updated.avatar.ends_with(".png"));
        assert_ne!(updated.avatar, alice.avatar);

        let updated = f
            .service
            .update_cover_image(alice.id, Some(staged("cover.jpg").await))
            .await
            .unwrap();
        assert!(updated.cover_image.ends_with(".jpg"));
        assert_eq!(f.uploader.uploads(), 2);
    }

    #[tokio::test]
    async fn test_update_image_failures_leave_user_unchanged() {
        let f = Fixture::new();
        let alice = f.user("alice").await;

        assert_eq!(
            f.service.update_avatar(alice.id, None).await,
            Err(AccountError::bad_request("Avatar file is missing"))
        );

        f.uploader.set_failing(true);
        assert_eq!(
            f.service
                .update_cover_image(alice.id, Some(staged("cover.jpg").await))
                .await,
            Err(AccountError::bad_request("Error while uploading cover image"))
        );

        let current = f.service.current_user(alice.id).await.unwrap();
        assert_eq!(current.avatar, alice.avatar);
        assert_eq!(current.cover_image, "");
    }
}
