//! 插图/封面引用 → 下载地址与本地文件名。

use std::collections::{HashMap, HashSet};

use crate::base_system::context::safe_fs_name;

/// 一项待下载的图片。`reference` 为正文或清单中的原始写法。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetJob {
    pub reference: String,
    pub url: String,
    pub file_name: String,
}

/// 站内相对路径补上 `base_url`；`//host/x` 补 `http:`；完整地址原样返回。
pub fn resolve_asset_url(reference: &str, base_url: &str) -> String {
    let reference = reference.trim();
    if reference.contains("://") {
        reference.to_string()
    } else if let Some(rest) = reference.strip_prefix("//") {
        format!("http://{rest}")
    } else {
        format!(
            "{}/{}",
            base_url.trim_end_matches('/'),
            reference.trim_start_matches('/')
        )
    }
}

/// 文件名取地址最后一段（去掉查询串）。
fn base_file_name(url: &str) -> String {
    let path = url.split(['?', '#']).next().unwrap_or_default();
    let last = path.rsplit('/').next().unwrap_or_default();
    let name = if last.is_empty() { "image" } else { last };
    safe_fs_name(name, "_", 120)
}

/// 按首次出现顺序去重；重名文件加序号前缀。
pub fn plan_assets<'a, I>(references: I, base_url: &str) -> Vec<AssetJob>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut seen = HashSet::new();
    let mut used_names: HashMap<String, usize> = HashMap::new();
    let mut jobs = Vec::new();

    for reference in references {
        let reference = reference.trim();
        if reference.is_empty() || !seen.insert(reference.to_string()) {
            continue;
        }
        let url = resolve_asset_url(reference, base_url);
        let base = base_file_name(&url);
        let count = used_names.entry(base.clone()).or_insert(0);
        *count += 1;
        let file_name = if *count == 1 {
            base
        } else {
            format!("{count}_{base}")
        };
        jobs.push(AssetJob {
            reference: reference.to_string(),
            url,
            file_name,
        });
    }
    jobs
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE: &str = "http://lknovel.lightnovel.cn";

    #[test]
    fn resolves_relative_and_absolute_refs() {
        assert_eq!(
            resolve_asset_url("/illustration/image/a.jpg", BASE),
            "http://lknovel.lightnovel.cn/illustration/image/a.jpg"
        );
        assert_eq!(
            resolve_asset_url("illustration/a.jpg", "http://x.cn/"),
            "http://x.cn/illustration/a.jpg"
        );
        assert_eq!(resolve_asset_url("//cdn.cn/a.png", BASE), "http://cdn.cn/a.png");
        assert_eq!(resolve_asset_url("https://h/a.png", BASE), "https://h/a.png");
    }

    #[test]
    fn plan_dedups_and_disambiguates_names() {
        let refs = [
            "/illustration/2012/a.jpg",
            "/illustration/2013/a.jpg",
            "/illustration/2012/a.jpg",
            "https://h/img/b.png?x=1",
            " ",
        ];
        let jobs = plan_assets(refs, BASE);
        let names: Vec<_> = jobs.iter().map(|j| j.file_name.as_str()).collect();
        assert_eq!(names, vec!["a.jpg", "2_a.jpg", "b.png"]);
        assert_eq!(jobs[1].url, "http://lknovel.lightnovel.cn/illustration/2013/a.jpg");
        assert_eq!(jobs[2].reference, "https://h/img/b.png?x=1");
    }

    #[test]
    fn trailing_slash_gets_placeholder_name() {
        let jobs = plan_assets(["/illustration/dir/"], BASE);
        assert_eq!(jobs[0].file_name, "image");
    }
}
