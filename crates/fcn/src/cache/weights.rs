//! # Pretrained Weight Descriptors

use crate::cache::disk::DiskCacheConfig;
use anyhow::{Context, bail};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

const X25: crc::Crc<u16> = crc::Crc::<u16>::new(&crc::CRC_16_IBM_SDLC);

/// Build a cache key (bare cache file name) from a name and URL.
///
/// The key is ``[{name}-]{url crc}-{url basename}``; the hash keeps
/// distinct URLs sharing a basename apart.
pub fn url_to_cache_key(
    name: Option<&str>,
    url: &str,
) -> String {
    let hash = X25.checksum(url.as_bytes()).to_string();
    let base_name = url.rsplit_once('/').map_or(url, |(_, base)| base);
    match name {
        Some(n) => format!("{n}-{hash}-{base_name}"),
        None => format!("{hash}-{base_name}"),
    }
}

/// Get the cache resource key for a pretrained weights file.
pub fn pretrained_weights_resource_key(cache_key: &str) -> Vec<String> {
    vec!["weights".to_string(), cache_key.to_string()]
}

/// Fetch a weights URL through the default disk cache.
pub fn fetch_model_weights<S: AsRef<str>>(url: S) -> anyhow::Result<PathBuf> {
    let url = url.as_ref();
    let resource = pretrained_weights_resource_key(&url_to_cache_key(Some("model"), url));
    DiskCacheConfig::default().fetch_resource(url, &resource)
}

/// Static [`PretrainedWeightsDescriptor`] provider.
#[derive(Debug)]
pub struct StaticPretrainedWeightsDescriptor<'a> {
    /// Name of the weights.
    pub name: &'a str,

    /// Description of the weights.
    pub description: &'a str,

    /// License.
    pub license: Option<&'a str>,

    /// Source URL.
    pub origin: Option<&'a str>,

    /// URLs to download the weights from, in preference order.
    pub urls: &'a [&'a str],
}

impl StaticPretrainedWeightsDescriptor<'_> {
    /// Convert to a [`PretrainedWeightsDescriptor`].
    pub fn to_descriptor(&self) -> PretrainedWeightsDescriptor {
        PretrainedWeightsDescriptor {
            name: self.name.to_string(),
            description: self.description.to_string(),
            license: self.license.map(|s| s.to_string()),
            origin: self.origin.map(|s| s.to_string()),
            urls: self.urls.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl From<&StaticPretrainedWeightsDescriptor<'_>> for PretrainedWeightsDescriptor {
    fn from(descriptor: &StaticPretrainedWeightsDescriptor) -> Self {
        descriptor.to_descriptor()
    }
}

/// A descriptor for a pretrained weights file.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct PretrainedWeightsDescriptor {
    /// Name of the weights.
    pub name: String,

    /// Description of the weights.
    pub description: String,

    /// License.
    pub license: Option<String>,

    /// Source URL.
    pub origin: Option<String>,

    /// URLs to download the weights from, in preference order.
    pub urls: Vec<String>,
}

impl PretrainedWeightsDescriptor {
    /// The preferred download URL.
    pub fn primary_url(&self) -> anyhow::Result<&str> {
        self.urls
            .first()
            .map(String::as_str)
            .with_context(|| format!("weights {} have no urls", self.name))
    }

    /// Cache Key
    ///
    /// The key is ``{name}-{url crc hash}-{url basename}``.
    pub fn cache_key(&self) -> anyhow::Result<String> {
        Ok(url_to_cache_key(Some(&self.name), self.primary_url()?))
    }

    /// Read-Through Cache the Model Weights
    ///
    /// # Returns
    ///
    /// The disk location of the cached weights.
    pub fn fetch_weights_to_disk_cache(
        &self,
        disk_cache: &DiskCacheConfig,
    ) -> anyhow::Result<PathBuf> {
        let url = self.primary_url()?;
        let resource = pretrained_weights_resource_key(&self.cache_key()?);
        disk_cache.fetch_resource(url, &resource)
    }
}

/// Static [`PretrainedWeightsMap`] builder.
#[derive(Debug)]
pub struct StaticPretrainedWeightsMap<'a> {
    /// List of static descriptors.
    pub items: &'a [&'a StaticPretrainedWeightsDescriptor<'a>],
}

impl StaticPretrainedWeightsMap<'_> {
    /// Convert to a [`PretrainedWeightsMap`].
    pub fn to_directory(&self) -> PretrainedWeightsMap {
        PretrainedWeightsMap {
            items: self
                .items
                .iter()
                .map(|d| {
                    let desc = d.to_descriptor();
                    (desc.name.clone(), desc)
                })
                .collect(),
        }
    }
}

impl From<&StaticPretrainedWeightsMap<'_>> for PretrainedWeightsMap {
    fn from(directory: &StaticPretrainedWeightsMap) -> Self {
        directory.to_directory()
    }
}

/// Directory of [`PretrainedWeightsDescriptor`]s.
#[derive(Debug, Clone, Default)]
pub struct PretrainedWeightsMap {
    /// Map of descriptors.
    pub items: BTreeMap<String, PretrainedWeightsDescriptor>,
}

impl PretrainedWeightsMap {
    /// Lookup a descriptor by name.
    pub fn lookup_by_name(
        &self,
        name: &str,
    ) -> Option<PretrainedWeightsDescriptor> {
        self.items.get(name).cloned()
    }

    /// Lookup a descriptor.
    pub fn try_lookup_by_name(
        &self,
        name: &str,
    ) -> anyhow::Result<PretrainedWeightsDescriptor> {
        match self.lookup_by_name(name) {
            Some(d) => Ok(d),
            None => bail!(
                "weights not found: {} (known: {:?})",
                name,
                self.items.keys().collect::<Vec<_>>()
            ),
        }
    }

    /// Lookup a descriptor.
    pub fn expect_lookup_by_name(
        &self,
        name: &str,
    ) -> PretrainedWeightsDescriptor {
        match self.try_lookup_by_name(name) {
            Ok(p) => p,
            Err(e) => panic!("{}", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    static DESCRIPTOR: StaticPretrainedWeightsDescriptor = StaticPretrainedWeightsDescriptor {
        name: "tv_in1k",
        description: "some weights",
        license: Some("bsd-3-clause"),
        origin: Some("https://github.com/pytorch/vision"),
        urls: &["https://example.com/models/net-0123.pth"],
    };

    #[test]
    fn test_url_to_cache_key() {
        let url = "https://example.com/models/net-0123.pth";
        let hash = X25.checksum(url.as_bytes());

        assert_eq!(
            url_to_cache_key(Some("tv"), url),
            format!("tv-{hash}-net-0123.pth")
        );
        assert_eq!(url_to_cache_key(None, url), format!("{hash}-net-0123.pth"));
        assert_ne!(
            url_to_cache_key(None, url),
            url_to_cache_key(None, "https://mirror.example.com/net-0123.pth")
        );
    }

    #[test]
    fn test_descriptor() {
        let desc = DESCRIPTOR.to_descriptor();
        assert_eq!(desc.name, "tv_in1k");
        assert_eq!(desc.primary_url().unwrap(), DESCRIPTOR.urls[0]);
        assert!(desc.cache_key().unwrap().starts_with("tv_in1k-"));

        let empty = PretrainedWeightsDescriptor {
            urls: vec![],
            ..desc
        };
        assert!(empty.primary_url().is_err());
        assert!(empty.cache_key().is_err());
    }

    #[test]
    fn test_fetch_cached_weights() {
        let tmp = tempfile::tempdir().unwrap();
        let cache = DiskCacheConfig::new().with_root_dir(Some(tmp.path().to_path_buf()));

        let desc = DESCRIPTOR.to_descriptor();
        let resource = pretrained_weights_resource_key(&desc.cache_key().unwrap());
        let path = cache.ensure_resource_parent_dir(&resource).unwrap();
        std::fs::write(&path, b"cached").unwrap();

        assert_eq!(desc.fetch_weights_to_disk_cache(&cache).unwrap(), path);
    }

    #[test]
    fn test_weights_map() {
        let map = StaticPretrainedWeightsMap {
            items: &[&DESCRIPTOR],
        }
        .to_directory();

        assert_eq!(map.expect_lookup_by_name("tv_in1k").name, "tv_in1k");
        assert!(map.lookup_by_name("nope").is_none());

        let err = map.try_lookup_by_name("nope").unwrap_err().to_string();
        assert!(err.contains("tv_in1k"));
    }
}
