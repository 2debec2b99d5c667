use once_cell::sync::Lazy;

#[derive(Debug)]
struct BuildMeta {
    build_id: String,
}

impl BuildMeta {
    fn collect() -> Self {
        Self {
            build_id: option_env!("STDHTTP_BUILD_ID")
                .unwrap_or("unknown build")
                .to_string(),
        }
    }
}

static META: Lazy<BuildMeta> = Lazy::new(BuildMeta::collect);

/// Full build identifier, e.g. "2025-10-05 15:47:12 UTC | v1.2.3-8a4f1d2-dirty".
pub fn build_id() -> &'static str {
    META.build_id.as_str()
}

/// One-line banner logged by binaries at startup.
pub fn formatted_banner(package: &str, version: &str) -> String {
    format!("{} {} | {}", package, version, build_id())
}

/// Value sent in the `User-Agent` header of outgoing requests.
pub fn user_agent(package: &str, version: &str) -> String {
    format!("{}/{}", package, version)
}
