//! Image catalog of an engine host.
//!
//! Catalog lookups never fail: an unreachable host or an empty account yields an empty catalog,
//! which callers surface as "no images available".

use std::collections::BTreeSet;

use crate::{
    config::{ImageRef, UNTAGGED_SENTINEL},
    engine::ContainerEngine,
    models::HostConfig,
};

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

/// Lists the images available on `host`.
///
/// With `with_tags` the result holds full `repository:tag` names, otherwise deduplicated bare
/// repository names. A non-empty `restrict_to` keeps only images whose repository it contains.
pub async fn list_images(
    engine: &dyn ContainerEngine,
    host: &HostConfig,
    with_tags: bool,
    restrict_to: &BTreeSet<String>,
) -> BTreeSet<String> {
    let images = match engine.list_images(host).await {
        Ok(images) => images,
        Err(e) => {
            tracing::warn!(
                "image catalog of {} unavailable, treating as empty: {}",
                host.get_hostname(),
                e
            );
            return BTreeSet::new();
        }
    };

    images
        .iter()
        .flat_map(|image| image.repo_tags.iter().flatten())
        .filter_map(|name| {
            let repository = ImageRef::repository_of(name);
            let tag = name[repository.len()..].strip_prefix(':');
            if repository.is_empty()
                || repository == UNTAGGED_SENTINEL
                || tag == Some(UNTAGGED_SENTINEL)
            {
                return None;
            }

            if !restrict_to.is_empty() && !restrict_to.contains(repository) {
                return None;
            }

            Some(if with_tags {
                name.clone()
            } else {
                repository.to_string()
            })
        })
        .collect()
}

/// Whether `image` may be run on `host`: it must be in the tagged catalog and pass the host's
/// allow-list.
pub async fn is_offered(engine: &dyn ContainerEngine, host: &HostConfig, image: &ImageRef) -> bool {
    if !host.allows(image.get_repository()) {
        return false;
    }

    list_images(engine, host, true, host.get_allowed_repositories())
        .await
        .contains(&image.to_string())
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------
