use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{QueryBuilder, Sqlite};

use super::database::SqliteStore;
use crate::models::blog::{Blog, BlogChanges, ImageSlot};
use crate::models::errors::AppError;
use crate::models::pagination::Page;
use crate::models::user::ImageRef;

/// Persistence for blog documents. Every write re-runs `Blog::validate`.
#[async_trait]
pub trait BlogStore: Send + Sync {
    async fn insert(&self, blog: &Blog) -> Result<(), AppError>;

    async fn find_by_id(&self, id: &str) -> Result<Option<Blog>, AppError>;

    /// Writes only the columns named in `changes`, taking their values from
    /// `blog`, the validated result of applying them. Each image change only
    /// applies while its column still holds the id it replaces. Fails with
    /// `NotFound` if the blog is gone and `Conflict` if an image guard no
    /// longer matches; in both cases nothing is written.
    async fn update(&self, blog: &Blog, changes: &BlogChanges) -> Result<(), AppError>;

    /// Returns false when there was nothing to delete
    async fn delete(&self, id: &str) -> Result<bool, AppError>;

    async fn list_published(&self, page: Option<Page>) -> Result<(Vec<Blog>, i64), AppError>;

    async fn list_by_author(&self, author_id: &str) -> Result<Vec<Blog>, AppError>;
}

#[derive(Debug, sqlx::FromRow)]
struct BlogRow {
    id: String,
    title: String,
    intro: String,
    main_image_public_id: String,
    main_image_url: String,
    para_one_title: Option<String>,
    para_one_description: Option<String>,
    para_one_image_public_id: Option<String>,
    para_one_image_url: Option<String>,
    para_two_title: Option<String>,
    para_two_description: Option<String>,
    para_two_image_public_id: Option<String>,
    para_two_image_url: Option<String>,
    para_three_title: Option<String>,
    para_three_description: Option<String>,
    para_three_image_public_id: Option<String>,
    para_three_image_url: Option<String>,
    category: String,
    created_by: String,
    author_name: String,
    author_avatar: String,
    published: bool,
    created_at: DateTime<Utc>,
}

fn image_ref(public_id: Option<String>, url: Option<String>) -> Option<ImageRef> {
    match (public_id, url) {
        (Some(public_id), Some(url)) => Some(ImageRef { public_id, url }),
        _ => None,
    }
}

fn image_columns(image: &Option<ImageRef>) -> (Option<String>, Option<String>) {
    match image {
        Some(image) => (Some(image.public_id.clone()), Some(image.url.clone())),
        None => (None, None),
    }
}

impl From<BlogRow> for Blog {
    fn from(row: BlogRow) -> Self {
        Blog {
            id: row.id,
            title: row.title,
            intro: row.intro,
            main_image: ImageRef {
                public_id: row.main_image_public_id,
                url: row.main_image_url,
            },
            para_one_title: row.para_one_title,
            para_one_description: row.para_one_description,
            para_one_image: image_ref(row.para_one_image_public_id, row.para_one_image_url),
            para_two_title: row.para_two_title,
            para_two_description: row.para_two_description,
            para_two_image: image_ref(row.para_two_image_public_id, row.para_two_image_url),
            para_three_title: row.para_three_title,
            para_three_description: row.para_three_description,
            para_three_image: image_ref(row.para_three_image_public_id, row.para_three_image_url),
            category: row.category,
            created_by: row.created_by,
            author_name: row.author_name,
            author_avatar: row.author_avatar,
            published: row.published,
            created_at: row.created_at,
        }
    }
}

const BLOG_COLUMNS: &str = "id, title, intro, main_image_public_id, main_image_url, \
    para_one_title, para_one_description, para_one_image_public_id, para_one_image_url, \
    para_two_title, para_two_description, para_two_image_public_id, para_two_image_url, \
    para_three_title, para_three_description, para_three_image_public_id, para_three_image_url, \
    category, created_by, author_name, author_avatar, published, created_at";

fn image_column_prefix(slot: ImageSlot) -> &'static str {
    match slot {
        ImageSlot::Main => "main_image",
        ImageSlot::ParaOne => "para_one_image",
        ImageSlot::ParaTwo => "para_two_image",
        ImageSlot::ParaThree => "para_three_image",
    }
}

fn validate(blog: &Blog) -> Result<(), AppError> {
    blog.validate().map_err(|message| {
        tracing::debug!("Blog {} failed validation: {}", blog.id, message);
        AppError::validation_failed(message)
    })
}

#[async_trait]
impl BlogStore for SqliteStore {
    async fn insert(&self, blog: &Blog) -> Result<(), AppError> {
        validate(blog)?;

        let (p1_id, p1_url) = image_columns(&blog.para_one_image);
        let (p2_id, p2_url) = image_columns(&blog.para_two_image);
        let (p3_id, p3_url) = image_columns(&blog.para_three_image);

        sqlx::query(&format!(
            "INSERT INTO blogs ({}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            BLOG_COLUMNS
        ))
        .bind(&blog.id)
        .bind(&blog.title)
        .bind(&blog.intro)
        .bind(&blog.main_image.public_id)
        .bind(&blog.main_image.url)
        .bind(&blog.para_one_title)
        .bind(&blog.para_one_description)
        .bind(p1_id)
        .bind(p1_url)
        .bind(&blog.para_two_title)
        .bind(&blog.para_two_description)
        .bind(p2_id)
        .bind(p2_url)
        .bind(&blog.para_three_title)
        .bind(&blog.para_three_description)
        .bind(p3_id)
        .bind(p3_url)
        .bind(&blog.category)
        .bind(&blog.created_by)
        .bind(&blog.author_name)
        .bind(&blog.author_avatar)
        .bind(blog.published)
        .bind(blog.created_at)
        .execute(self.pool())
        .await?;

        tracing::debug!("Inserted blog {}", blog.id);
        Ok(())
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<Blog>, AppError> {
        let row = sqlx::query_as::<_, BlogRow>(&format!(
            "SELECT {} FROM blogs WHERE id = ?",
            BLOG_COLUMNS
        ))
        .bind(id)
        .fetch_optional(self.pool())
        .await?;

        Ok(row.map(Blog::from))
    }

    async fn update(&self, blog: &Blog, changes: &BlogChanges) -> Result<(), AppError> {
        validate(blog)?;

        if changes.is_empty() {
            return match BlogStore::find_by_id(self, &blog.id).await? {
                Some(_) => Ok(()),
                None => Err(AppError::not_found("Blog not found!")),
            };
        }

        let fields = &changes.fields;
        let text_columns = [
            ("title", fields.title.is_some(), Some(blog.title.clone())),
            ("intro", fields.intro.is_some(), Some(blog.intro.clone())),
            ("category", fields.category.is_some(), Some(blog.category.clone())),
            ("para_one_title", fields.para_one_title.is_some(), blog.para_one_title.clone()),
            (
                "para_one_description",
                fields.para_one_description.is_some(),
                blog.para_one_description.clone(),
            ),
            ("para_two_title", fields.para_two_title.is_some(), blog.para_two_title.clone()),
            (
                "para_two_description",
                fields.para_two_description.is_some(),
                blog.para_two_description.clone(),
            ),
            ("para_three_title", fields.para_three_title.is_some(), blog.para_three_title.clone()),
            (
                "para_three_description",
                fields.para_three_description.is_some(),
                blog.para_three_description.clone(),
            ),
        ];

        // created_by, author_name, author_avatar and created_at are never rewritten
        let mut query: QueryBuilder<Sqlite> = QueryBuilder::new("UPDATE blogs SET ");
        {
            let mut set = query.separated(", ");
            for (column, present, value) in text_columns {
                if present {
                    set.push(format!("{} = ", column));
                    set.push_bind_unseparated(value);
                }
            }
            if fields.published.is_some() {
                set.push("published = ");
                set.push_bind_unseparated(blog.published);
            }
            for change in &changes.images {
                let prefix = image_column_prefix(change.slot);
                set.push(format!("{}_public_id = ", prefix));
                set.push_bind_unseparated(change.image.public_id.clone());
                set.push(format!("{}_url = ", prefix));
                set.push_bind_unseparated(change.image.url.clone());
            }
        }

        query.push(" WHERE id = ");
        query.push_bind(blog.id.clone());
        for change in &changes.images {
            // IS compares NULL as a value, so an empty column is guarded too
            query.push(format!(" AND {}_public_id IS ", image_column_prefix(change.slot)));
            query.push_bind(change.replaces.clone());
        }

        let result = query.build().execute(self.pool()).await?;

        if result.rows_affected() == 0 {
            return match BlogStore::find_by_id(self, &blog.id).await? {
                Some(_) => {
                    tracing::warn!("Blog {} images changed concurrently, update rejected", blog.id);
                    Err(AppError::conflict(
                        "Blog images were changed by another request, please retry",
                    ))
                }
                None => Err(AppError::not_found("Blog not found!")),
            };
        }

        tracing::debug!("Updated blog {}", blog.id);
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<bool, AppError> {
        let result = sqlx::query("DELETE FROM blogs WHERE id = ?")
            .bind(id)
            .execute(self.pool())
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn list_published(&self, page: Option<Page>) -> Result<(Vec<Blog>, i64), AppError> {
        // LIMIT -1 means no limit in SQLite
        let (limit, offset) = page
            .map(|p| (i64::from(p.limit), p.offset()))
            .unwrap_or((-1, 0));

        let rows = sqlx::query_as::<_, BlogRow>(&format!(
            "SELECT {} FROM blogs WHERE published = 1 ORDER BY created_at DESC LIMIT ? OFFSET ?",
            BLOG_COLUMNS
        ))
        .bind(limit)
        .bind(offset)
        .fetch_all(self.pool())
        .await?;

        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM blogs WHERE published = 1")
            .fetch_one(self.pool())
            .await?;

        Ok((rows.into_iter().map(Blog::from).collect(), total))
    }

    async fn list_by_author(&self, author_id: &str) -> Result<Vec<Blog>, AppError> {
        let rows = sqlx::query_as::<_, BlogRow>(&format!(
            "SELECT {} FROM blogs WHERE created_by = ? ORDER BY created_at DESC",
            BLOG_COLUMNS
        ))
        .bind(author_id)
        .fetch_all(self.pool())
        .await?;

        Ok(rows.into_iter().map(Blog::from).collect())
    }
}
