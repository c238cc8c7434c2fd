//! Picks the channels an environment's notifications go to.

use std::sync::Arc;

use crate::{
    models::{ChannelOwner, Environment, NotificationChannel},
    persistence::{error::PersistenceError, traits::ChannelRepository},
};

/// Resolves enabled channels with environment-over-project precedence.
pub struct ChannelResolver<C: ChannelRepository + ?Sized> {
    repository: Arc<C>,
}

impl<C: ChannelRepository + ?Sized> ChannelResolver<C> {
    /// Creates a resolver over `repository`.
    pub fn new(repository: Arc<C>) -> Self {
        Self { repository }
    }

    /// The environment's enabled channels, or the project's when the
    /// environment has none. The two levels are never merged.
    #[tracing::instrument(skip(self, environment), fields(environment_id = environment.id), level = "debug")]
    pub async fn resolve_enabled_channels(
        &self,
        environment: &Environment,
    ) -> Result<Vec<NotificationChannel>, PersistenceError> {
        let own = self.repository.enabled_channels(ChannelOwner::Environment(environment.id)).await?;
        if !own.is_empty() {
            tracing::debug!(count = own.len(), "Using environment channels.");
            return Ok(own);
        }

        let inherited =
            self.repository.enabled_channels(ChannelOwner::Project(environment.project_id)).await?;
        tracing::debug!(count = inherited.len(), "Using project channels.");
        Ok(inherited)
    }
}

#[cfg(test)]
mod tests {
    use mockall::predicate::eq;

    use super::*;
    use crate::{
        persistence::traits::MockChannelRepository,
        test_helpers::{ChannelBuilder, EnvironmentBuilder},
    };

    #[tokio::test]
    async fn test_environment_channels_win() {
        let environment = EnvironmentBuilder::new().id(5).project_id(2).build();
        let mut repo = MockChannelRepository::new();
        repo.expect_enabled_channels()
            .with(eq(ChannelOwner::Environment(5)))
            .times(1)
            .returning(|owner| Ok(vec![ChannelBuilder::new(owner).channel("#env").build()]));
        repo.expect_enabled_channels().with(eq(ChannelOwner::Project(2))).never();

        let resolver = ChannelResolver::new(Arc::new(repo));
        let channels = resolver.resolve_enabled_channels(&environment).await.unwrap();

        assert_eq!(channels.len(), 1);
        assert_eq!(channels[0].config["channel"], "#env");
    }

    #[tokio::test]
    async fn test_falls_back_to_project_channels() {
        let environment = EnvironmentBuilder::new().id(5).project_id(2).build();
        let mut repo = MockChannelRepository::new();
        repo.expect_enabled_channels()
            .with(eq(ChannelOwner::Environment(5)))
            .times(1)
            .returning(|_| Ok(vec![]));
        repo.expect_enabled_channels()
            .with(eq(ChannelOwner::Project(2)))
            .times(1)
            .returning(|owner| Ok(vec![ChannelBuilder::new(owner).channel("#project").build()]));

        let resolver = ChannelResolver::new(Arc::new(repo));
        let channels = resolver.resolve_enabled_channels(&environment).await.unwrap();

        assert_eq!(channels.len(), 1);
        assert_eq!(channels[0].owner, ChannelOwner::Project(2));
    }

    #[tokio::test]
    async fn test_no_channels_anywhere() {
        let environment = EnvironmentBuilder::new().build();
        let mut repo = MockChannelRepository::new();
        repo.expect_enabled_channels().times(2).returning(|_| Ok(vec![]));

        let resolver = ChannelResolver::new(Arc::new(repo));
        assert!(resolver.resolve_enabled_channels(&environment).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_repository_errors_propagate() {
        let environment = EnvironmentBuilder::new().build();
        let mut repo = MockChannelRepository::new();
        repo.expect_enabled_channels()
            .returning(|_| Err(PersistenceError::OperationFailed("locked".into())));

        let resolver = ChannelResolver::new(Arc::new(repo));
        assert!(resolver.resolve_enabled_channels(&environment).await.is_err());
    }
}
