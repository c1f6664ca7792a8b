//! Course and enrollment reads behind the browser cache

use std::sync::Arc;

use async_trait::async_trait;

use super::browser::{BrowserCache, CacheKey};
use crate::error::SheetResult;
use crate::permission::{AccessDecision, PermissionResolver, User};
use crate::types::Course;

/// Live read API of the portal
#[async_trait]
pub trait PortalApi: Send + Sync {
    async fn fetch_course(&self, course_id: &str) -> SheetResult<Course>;

    async fn list_courses(&self) -> SheetResult<Vec<Course>>;

    /// The user record including their enrollments
    async fn fetch_user(&self, user_id: &str) -> SheetResult<User>;
}

/// Portal reads served from the cache when possible.
///
/// Mutations made elsewhere must be reported through `course_changed` or
/// `enrollments_changed` so stale entries are dropped.
pub struct CachedPortal {
    api: Arc<dyn PortalApi>,
    cache: BrowserCache,
    resolver: PermissionResolver,
}

impl CachedPortal {
    pub fn new(api: Arc<dyn PortalApi>, cache: BrowserCache) -> Self {
        Self {
            api,
            cache,
            resolver: PermissionResolver::new(),
        }
    }

    pub fn cache(&self) -> &BrowserCache {
        &self.cache
    }

    pub async fn course(&self, course_id: &str) -> SheetResult<Course> {
        let ttl = self.cache.settings().default_ttl;
        self.cache
            .get_or_fetch(&CacheKey::Course(course_id.to_string()), ttl, || {
                self.api.fetch_course(course_id)
            })
            .await
    }

    pub async fn courses(&self) -> SheetResult<Vec<Course>> {
        let ttl = self.cache.settings().default_ttl;
        self.cache
            .get_or_fetch(&CacheKey::CourseList, ttl, || self.api.list_courses())
            .await
    }

    pub async fn user(&self, user_id: &str) -> SheetResult<User> {
        let ttl = self.cache.settings().default_ttl;
        self.cache
            .get_or_fetch(&CacheKey::Enrollments(user_id.to_string()), ttl, || {
                self.api.fetch_user(user_id)
            })
            .await
    }

    /// Resolve access to a course from cached user and course data
    pub async fn course_access(&self, user_id: &str, course_id: &str) -> SheetResult<AccessDecision> {
        let user = self.user(user_id).await?;
        let course = self.course(course_id).await?;
        Ok(self
            .resolver
            .decide(&user, &course.id, course.requires_membership))
    }

    pub fn course_changed(&self, course_id: &str) {
        self.cache.invalidate(&CacheKey::Course(course_id.to_string()));
        self.cache.invalidate(&CacheKey::CourseList);
    }

    pub fn enrollments_changed(&self, user_id: &str) {
        self.cache
            .invalidate(&CacheKey::Enrollments(user_id.to_string()));
    }
}
