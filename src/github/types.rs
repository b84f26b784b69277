use serde::Deserialize;

/// Tag recorded when the release reports none.
pub const PLACEHOLDER_TAG: &str = "latest";

/// Body of `/releases/latest`, restricted to the fields the logger records.
#[derive(Debug, Deserialize)]
struct ReleaseResponse {
    #[serde(default)]
    tag_name: Option<String>,
    #[serde(default)]
    assets: Option<Vec<AssetResponse>>,
}

#[derive(Debug, Deserialize)]
struct AssetResponse {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    download_count: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Release {
    pub tag: String,
    pub assets: Vec<ReleaseAsset>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleaseAsset {
    pub name: String,
    /// Cumulative downloads since the asset was uploaded.
    pub download_count: u64,
}

impl Release {
    pub fn from_json(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        let resp: ReleaseResponse = serde_json::from_slice(bytes)?;
        Ok(Self::from_response(resp))
    }

    fn from_response(resp: ReleaseResponse) -> Self {
        let tag = resp
            .tag_name
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| PLACEHOLDER_TAG.to_string());
        let assets = resp
            .assets
            .unwrap_or_default()
            .into_iter()
            .map(|a| ReleaseAsset {
                name: a.name.unwrap_or_default(),
                download_count: a.download_count.unwrap_or(0),
            })
            .collect();
        Self { tag, assets }
    }
}
