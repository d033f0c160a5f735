use media_ingestion_domain::MediaType;
use std::collections::HashMap;
use std::sync::Arc;

use crate::media_service::{MediaProviderService, MediaServiceError};

/// Immutable media type -> provider service map, built once at startup.
pub struct ProviderServiceRegistry {
    services: HashMap<MediaType, Arc<MediaProviderService>>,
}

impl ProviderServiceRegistry {
    pub fn builder() -> ProviderServiceRegistryBuilder {
        ProviderServiceRegistryBuilder::default()
    }

    pub fn get(&self, media_type: MediaType) -> Result<&Arc<MediaProviderService>, MediaServiceError> {
        self.services
            .get(&media_type)
            .ok_or(MediaServiceError::NotRegistered(media_type))
    }

    /// Registered types in [`MediaType::ALL`] order.
    pub fn media_types(&self) -> Vec<MediaType> {
        MediaType::ALL
            .into_iter()
            .filter(|media_type| self.services.contains_key(media_type))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.services.len()
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }
}

#[derive(Default)]
pub struct ProviderServiceRegistryBuilder {
    services: HashMap<MediaType, Arc<MediaProviderService>>,
}

impl ProviderServiceRegistryBuilder {
    pub fn register(mut self, service: MediaProviderService) -> Result<Self, MediaServiceError> {
        let media_type = service.media_type();
        if self.services.contains_key(&media_type) {
            return Err(MediaServiceError::DuplicateRegistration(media_type));
        }
        self.services.insert(media_type, Arc::new(service));
        Ok(self)
    }

    pub fn build(self) -> ProviderServiceRegistry {
        ProviderServiceRegistry {
            services: self.services,
        }
    }
}
