//! Template rendering for repository info pages.
//!
//! Info pages and READMEs may use Jinja syntax against a small set of
//! repository values: `installed`, `pending_update`, `prerelease`,
//! `selected_tag`, `version_available` and `version_installed`.

use minijinja::{Environment, context};
use tracing::debug;

use super::RepositoryEntity;

/// Render `content` against `entity`.
///
/// Content that fails to parse or render is returned unchanged.
pub fn render_template(content: &str, entity: &RepositoryEntity) -> String {
    let prerelease = entity
        .releases
        .last_release_object()
        .is_some_and(|release| release.prerelease);

    let env = Environment::new();
    let rendered = env.render_str(
        content,
        context! {
            installed => entity.data.installed,
            pending_update => entity.pending_update(),
            prerelease => prerelease,
            selected_tag => entity.data.selected_tag.as_deref(),
            version_available => entity.releases.last_release.as_deref(),
            version_installed => entity.display_installed_version(),
        },
    );

    match rendered {
        Ok(rendered) => rendered,
        Err(e) => {
            debug!(repository = %entity.string(), error = %e, "Template not rendered");
            content.to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Category, Release};

    fn card() -> RepositoryEntity {
        let mut entity = RepositoryEntity::new("owner/card", Category::Plugin);
        entity.data.releases = true;
        entity.releases.last_release = Some("1.1.0".to_string());
        entity.releases.objects = vec![Release {
            tag_name: "1.1.0".to_string(),
            ..Release::default()
        }];
        entity
    }

    #[test]
    fn test_plain_content_unchanged() {
        assert_eq!(render_template("ABC", &card()), "ABC");
    }

    #[test]
    fn test_renders_repository_values() {
        let mut entity = card();
        let content = "{% if installed %}Installed {{ version_installed }}, \
                       {% if pending_update %}update to {{ version_available }}{% endif %}\
                       {% else %}Not installed{% endif %}";
        assert_eq!(render_template(content, &entity), "Not installed");

        entity.set_installed(Some("1.0.0".to_string()), None);
        assert_eq!(
            render_template(content, &entity),
            "Installed 1.0.0, update to 1.1.0"
        );
    }

    #[test]
    fn test_prerelease_follows_latest_release() {
        let mut entity = card();
        let content = "{% if prerelease %}beta{% else %}stable{% endif %}";
        assert_eq!(render_template(content, &entity), "stable");

        entity.releases.objects[0].prerelease = true;
        assert_eq!(render_template(content, &entity), "beta");

        entity.releases.last_release = None;
        assert_eq!(render_template(content, &entity), "stable");
    }

    #[test]
    fn test_broken_template_returns_content() {
        let content = "{% if installed %}unterminated";
        assert_eq!(render_template(content, &card()), content);
    }
}
