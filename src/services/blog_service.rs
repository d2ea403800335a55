use futures_util::future::join_all;
use std::collections::HashMap;
use std::sync::Arc;

use super::blog_store::BlogStore;
use super::database::parse_id;
use super::media_host::{destroy_quietly, MediaHost};
use crate::models::blog::{Blog, BlogChanges, BlogFields, ImageChange, ImageSlot};
use crate::models::errors::AppError;
use crate::models::pagination::Page;
use crate::models::user::{ImageRef, User};
use crate::utils::multipart::UploadedFile;

pub const UPLOAD_FAILED_MESSAGE: &str = "Error occurred while uploading one or more images";

/// Image files submitted with a blog request, keyed by the field they replace
pub type BlogImages = HashMap<ImageSlot, UploadedFile>;

/// Blog CRUD plus the image upload, replacement and cleanup around it.
///
/// Uploads are staged before any document write. If a write fails the staged
/// assets are destroyed again, and replaced assets are only destroyed after
/// the write has succeeded.
#[derive(Clone)]
pub struct BlogService {
    blogs: Arc<dyn BlogStore>,
    media: Arc<dyn MediaHost>,
}

impl BlogService {
    pub fn new(blogs: Arc<dyn BlogStore>, media: Arc<dyn MediaHost>) -> Self {
        Self { blogs, media }
    }

    /// Creates a blog owned by `author` with a snapshot of their name and avatar
    pub async fn create(
        &self,
        author: &User,
        fields: BlogFields,
        images: BlogImages,
    ) -> Result<Blog, AppError> {
        if !images.contains_key(&ImageSlot::Main) {
            return Err(AppError::validation_failed("Blog Main Image Is Mandatory!"));
        }
        ensure_images(&images)?;

        if [&fields.title, &fields.intro, &fields.category]
            .iter()
            .any(|value| value.as_deref().map_or(true, |v| v.trim().is_empty()))
        {
            return Err(AppError::validation_failed(
                "Title, Intro, and Category Are Required Fields!",
            ));
        }

        let mut staged = self.upload_all(&images).await?;
        let main_image = match staged.remove(&ImageSlot::Main) {
            Some(image) => image,
            None => return Err(AppError::upload_failed(UPLOAD_FAILED_MESSAGE)),
        };

        let mut blog = Blog::new(fields, main_image, author);
        for (slot, image) in staged {
            blog.set_image(slot, image);
        }

        if let Err(e) = self.blogs.insert(&blog).await {
            tracing::warn!("Blog insert failed, removing {} staged images", blog.images().len());
            destroy_quietly(self.media.as_ref(), public_ids(blog.images())).await;
            return Err(e);
        }

        tracing::info!(
            "Blog {} created by {} with {} images",
            blog.id,
            author.id,
            blog.images().len()
        );
        Ok(blog)
    }

    /// Applies a partial update. Only fields present in `fields` and `images`
    /// are written, so concurrent updates to other fields are kept. An image
    /// is only swapped while the stored one is still the one this request
    /// read; otherwise the update fails with `Conflict`.
    pub async fn update(
        &self,
        id: &str,
        fields: BlogFields,
        images: BlogImages,
    ) -> Result<Blog, AppError> {
        let id = parse_id(id)?;
        let mut blog = self
            .blogs
            .find_by_id(&id)
            .await?
            .ok_or_else(|| AppError::not_found("Blog not found!"))?;

        ensure_images(&images)?;
        let staged = self.upload_all(&images).await?;

        let mut changes = BlogChanges {
            fields: fields.clone(),
            images: Vec::with_capacity(staged.len()),
        };
        for (slot, image) in &staged {
            changes.images.push(ImageChange {
                slot: *slot,
                image: image.clone(),
                replaces: blog.image(*slot).map(|old| old.public_id.clone()),
            });
            blog.set_image(*slot, image.clone());
        }
        blog.apply(fields);

        if let Err(e) = self.blogs.update(&blog, &changes).await {
            destroy_quietly(self.media.as_ref(), public_ids(staged.values())).await;
            return Err(e);
        }

        let replaced = changes
            .images
            .iter()
            .filter_map(|change| change.replaces.clone())
            .collect::<Vec<_>>();
        destroy_quietly(self.media.as_ref(), replaced).await;

        tracing::info!("Blog {} updated ({} images replaced)", blog.id, staged.len());

        // Columns outside this patch may have been written by someone else
        match self.blogs.find_by_id(&id).await {
            Ok(Some(stored)) => Ok(stored),
            Ok(None) => Ok(blog),
            Err(e) => {
                tracing::warn!("Re-reading blog {} after update failed: {}", id, e);
                Ok(blog)
            }
        }
    }

    /// Removes the blog, then its remote images
    pub async fn delete(&self, id: &str) -> Result<(), AppError> {
        let id = parse_id(id)?;
        let blog = self
            .blogs
            .find_by_id(&id)
            .await?
            .ok_or_else(|| AppError::not_found("Blog not Found!"))?;

        if !self.blogs.delete(&id).await? {
            return Err(AppError::not_found("Blog not Found!"));
        }

        destroy_quietly(self.media.as_ref(), public_ids(blog.images())).await;

        tracing::info!("Blog {} deleted", id);
        Ok(())
    }

    pub async fn get(&self, id: &str) -> Result<Blog, AppError> {
        let id = parse_id(id)?;
        self.blogs
            .find_by_id(&id)
            .await?
            .ok_or_else(|| AppError::not_found("Blog not found"))
    }

    pub async fn list_by_author(&self, author_id: &str) -> Result<Vec<Blog>, AppError> {
        self.blogs.list_by_author(author_id).await
    }

    pub async fn list_published(&self, page: Option<Page>) -> Result<(Vec<Blog>, i64), AppError> {
        self.blogs.list_published(page).await
    }

    /// Uploads every file concurrently. If any upload fails the successful ones
    /// are destroyed and the whole batch fails.
    async fn upload_all(&self, images: &BlogImages) -> Result<HashMap<ImageSlot, ImageRef>, AppError> {
        let uploads = images.iter().map(|(slot, file)| {
            let media = Arc::clone(&self.media);
            async move { (*slot, media.upload(file).await) }
        });

        let mut staged = HashMap::new();
        let mut failed = false;
        for (slot, result) in join_all(uploads).await {
            match result {
                Ok(image) => {
                    staged.insert(slot, image);
                }
                Err(e) => {
                    tracing::error!("Upload of {} failed: {}", slot.field_name(), e);
                    failed = true;
                }
            }
        }

        if failed {
            destroy_quietly(self.media.as_ref(), public_ids(staged.values())).await;
            return Err(AppError::upload_failed(UPLOAD_FAILED_MESSAGE));
        }

        Ok(staged)
    }
}

/// Rejects the whole request if any supplied file is not an accepted image
fn ensure_images(images: &BlogImages) -> Result<(), AppError> {
    images.values().try_for_each(|file| file.ensure_image().map(|_| ()))
}

fn public_ids<'a, I>(images: I) -> Vec<String>
where
    I: IntoIterator<Item = &'a ImageRef>,
{
    images.into_iter().map(|image| image.public_id.clone()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::blog::INTRO_MIN_CHARS;
    use crate::models::user::{NewUser, Role};
    use crate::services::database::{test_store, SqliteStore};
    use crate::services::media_host::InMemoryMediaHost;
    use crate::services::user_store::UserStore;

    struct Fixture {
        service: BlogService,
        media: InMemoryMediaHost,
        store: SqliteStore,
        author: User,
        _dir: tempfile::TempDir,
    }

    async fn fixture() -> Fixture {
        let (store, dir) = test_store().await;
        let author = store
            .create(NewUser {
                name: "Blog Author".to_string(),
                email: "author@example.com".to_string(),
                password_hash: "hash".to_string(),
                phone: "5550101".to_string(),
                role: Role::Author,
                education: "MA".to_string(),
                avatar: Some(ImageRef {
                    public_id: "avatars/author".to_string(),
                    url: "memory://avatars/author".to_string(),
                }),
            })
            .await
            .unwrap();
        let media = InMemoryMediaHost::new();
        let service = BlogService::new(Arc::new(store.clone()), Arc::new(media.clone()));

        Fixture {
            service,
            media,
            store,
            author,
            _dir: dir,
        }
    }

    fn jpeg(slot: ImageSlot) -> UploadedFile {
        UploadedFile {
            field: slot.field_name().to_string(),
            file_name: Some("valid.jpg".to_string()),
            content_type: Some("image/jpeg".to_string()),
            data: vec![0xFF, 0xD8, 0xFF, 0xE0, 0x00],
        }
    }

    fn images(slots: &[ImageSlot]) -> BlogImages {
        slots.iter().map(|slot| (*slot, jpeg(*slot))).collect()
    }

    fn fields() -> BlogFields {
        BlogFields {
            title: Some("A valid title here".to_string()),
            intro: Some("x".repeat(INTRO_MIN_CHARS)),
            category: Some("Tech".to_string()),
            ..BlogFields::default()
        }
    }

    #[tokio::test]
    async fn test_create_with_main_image_only() {
        let f = fixture().await;
        let blog = f
            .service
            .create(&f.author, fields(), images(&[ImageSlot::Main]))
            .await
            .unwrap();

        assert!(!blog.published);
        assert_eq!(blog.author_name, "Blog Author");
        assert_eq!(blog.author_avatar, "memory://avatars/author");
        assert_eq!(blog.para_one_image, None);

        let stored = f.service.get(&blog.id).await.unwrap();
        assert_eq!(stored.title, blog.title);
        assert_eq!(stored.main_image, blog.main_image);
        assert_eq!(stored.created_by, f.author.id);
        assert_eq!(f.media.uploads().len(), 1);
    }

    #[tokio::test]
    async fn test_create_requires_main_image() {
        let f = fixture().await;

        let err = f
            .service
            .create(&f.author, fields(), BlogImages::new())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::ValidationError { .. }));

        let err = f
            .service
            .create(&f.author, fields(), images(&[ImageSlot::ParaOne]))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::ValidationError { .. }));
        assert!(f.media.uploads().is_empty());
    }

    #[tokio::test]
    async fn test_create_rejects_bad_mime_before_upload() {
        let f = fixture().await;
        let mut files = images(&[ImageSlot::Main]);
        files.insert(
            ImageSlot::ParaTwo,
            UploadedFile {
                content_type: Some("image/gif".to_string()),
                ..jpeg(ImageSlot::ParaTwo)
            },
        );

        let err = f.service.create(&f.author, fields(), files).await.unwrap_err();
        assert!(matches!(err, AppError::UnsupportedMediaType { .. }));
        assert!(f.media.uploads().is_empty());
    }

    #[tokio::test]
    async fn test_partial_upload_failure_cleans_up() {
        let f = fixture().await;
        f.media.fail_uploads_for_field("paraTwoImage");

        let err = f
            .service
            .create(
                &f.author,
                fields(),
                images(&[ImageSlot::Main, ImageSlot::ParaOne, ImageSlot::ParaTwo]),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::UploadError { .. }));
        assert_eq!(f.media.uploads().len(), 2);
        assert_eq!(f.media.destroyed().len(), 2);
        assert_eq!(f.media.stored_count(), 0);
        assert!(f.store.list_by_author(&f.author.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_failed_insert_destroys_uploads() {
        let f = fixture().await;
        let mut bad = fields();
        bad.title = Some("short".to_string());

        let err = f
            .service
            .create(&f.author, bad, images(&[ImageSlot::Main, ImageSlot::ParaThree]))
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::ValidationError { .. }));
        assert_eq!(f.media.stored_count(), 0);
    }

    #[tokio::test]
    async fn test_update_main_image_replaces_once() {
        let f = fixture().await;
        let blog = f
            .service
            .create(&f.author, fields(), images(&[ImageSlot::Main]))
            .await
            .unwrap();
        let old_id = blog.main_image.public_id.clone();

        let updated = f
            .service
            .update(&blog.id, BlogFields::default(), images(&[ImageSlot::Main]))
            .await
            .unwrap();

        assert_ne!(updated.main_image.public_id, old_id);
        assert_eq!(f.media.destroyed(), vec![old_id]);
        assert_eq!(f.media.uploads().len(), 2);

        let stored = f.service.get(&blog.id).await.unwrap();
        assert_eq!(stored.main_image, updated.main_image);
    }

    #[tokio::test]
    async fn test_update_published_only() {
        let f = fixture().await;
        let blog = f
            .service
            .create(&f.author, fields(), images(&[ImageSlot::Main, ImageSlot::ParaOne]))
            .await
            .unwrap();

        let updated = f
            .service
            .update(
                &blog.id,
                BlogFields {
                    published: Some(true),
                    ..BlogFields::default()
                },
                BlogImages::new(),
            )
            .await
            .unwrap();

        assert!(updated.published);
        assert_eq!(updated.title, blog.title);
        assert_eq!(updated.main_image, blog.main_image);
        assert_eq!(updated.para_one_image, blog.para_one_image);
        assert!(f.media.destroyed().is_empty());
    }

    #[tokio::test]
    async fn test_update_adds_new_section_image_without_destroy() {
        let f = fixture().await;
        let blog = f
            .service
            .create(&f.author, fields(), images(&[ImageSlot::Main]))
            .await
            .unwrap();

        let updated = f
            .service
            .update(&blog.id, BlogFields::default(), images(&[ImageSlot::ParaTwo]))
            .await
            .unwrap();

        assert!(updated.para_two_image.is_some());
        assert!(f.media.destroyed().is_empty());
    }

    #[tokio::test]
    async fn test_invalid_update_keeps_old_images() {
        let f = fixture().await;
        let blog = f
            .service
            .create(&f.author, fields(), images(&[ImageSlot::Main]))
            .await
            .unwrap();

        let err = f
            .service
            .update(
                &blog.id,
                BlogFields {
                    intro: Some("short".to_string()),
                    ..BlogFields::default()
                },
                images(&[ImageSlot::Main]),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::ValidationError { .. }));
        assert!(f.media.contains(&blog.main_image.public_id));
        assert_eq!(f.media.stored_count(), 1);
        let stored = f.service.get(&blog.id).await.unwrap();
        assert_eq!(stored.intro, blog.intro);
        assert_eq!(stored.main_image, blog.main_image);
    }

    #[tokio::test]
    async fn test_concurrent_image_and_publish_updates_both_stick() {
        let f = fixture().await;
        let blog = f
            .service
            .create(&f.author, fields(), images(&[ImageSlot::Main]))
            .await
            .unwrap();
        let publish = BlogFields {
            published: Some(true),
            ..BlogFields::default()
        };

        let (swap, flip) = tokio::join!(
            f.service
                .update(&blog.id, BlogFields::default(), images(&[ImageSlot::Main])),
            f.service.update(&blog.id, publish, BlogImages::new()),
        );
        swap.unwrap();
        flip.unwrap();

        let stored = f.service.get(&blog.id).await.unwrap();
        assert!(stored.published);
        assert_ne!(stored.main_image.public_id, blog.main_image.public_id);
        assert!(f.media.contains(&stored.main_image.public_id));
        assert_eq!(f.media.destroyed(), vec![blog.main_image.public_id.clone()]);
        assert_eq!(f.media.stored_count(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_main_image_swaps_leave_one_live_asset() {
        let f = fixture().await;
        let blog = f
            .service
            .create(&f.author, fields(), images(&[ImageSlot::Main]))
            .await
            .unwrap();

        let (first, second) = tokio::join!(
            f.service
                .update(&blog.id, BlogFields::default(), images(&[ImageSlot::Main])),
            f.service
                .update(&blog.id, BlogFields::default(), images(&[ImageSlot::Main])),
        );
        for result in [&first, &second] {
            assert!(matches!(result, Ok(_) | Err(AppError::Conflict { .. })));
        }
        assert!(first.is_ok() || second.is_ok());

        let stored = f.service.get(&blog.id).await.unwrap();
        assert!(f.media.contains(&stored.main_image.public_id));
        assert!(!f.media.destroyed().contains(&stored.main_image.public_id));
        assert_eq!(f.media.stored_count(), 1);
    }

    #[tokio::test]
    async fn test_delete_removes_document_and_images() {
        let f = fixture().await;
        let blog = f
            .service
            .create(&f.author, fields(), images(&[ImageSlot::Main, ImageSlot::ParaOne]))
            .await
            .unwrap();

        f.service.delete(&blog.id).await.unwrap();

        assert!(matches!(
            f.service.get(&blog.id).await,
            Err(AppError::NotFound { .. })
        ));
        assert_eq!(f.media.stored_count(), 0);
        assert_eq!(f.media.destroyed().len(), 2);
    }

    #[tokio::test]
    async fn test_missing_and_malformed_ids() {
        let f = fixture().await;
        let missing = uuid::Uuid::new_v4().to_string();

        assert!(matches!(
            f.service.delete(&missing).await,
            Err(AppError::NotFound { .. })
        ));
        assert!(matches!(
            f.service.update(&missing, BlogFields::default(), BlogImages::new()).await,
            Err(AppError::NotFound { .. })
        ));
        assert!(matches!(
            f.service.get("not-an-id").await,
            Err(AppError::InvalidId { .. })
        ));
    }
}
