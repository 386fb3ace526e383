//! Default query strings
//!
//! Derives the free-text query for a scene from its file path or stored
//! metadata, depending on the configured parse mode.

use crate::tagger::settings::{ParseMode, TaggerConfig};
use crate::tagger::types::StoredScene;
use lazy_static::lazy_static;
use regex::{Regex, RegexBuilder};

lazy_static! {
    static ref DRIVE_LETTER: Regex = Regex::new(r"^[a-z]:$").unwrap();
    static ref SHORT_DATE: Regex = Regex::new(r"\b(\d{2})\.(\d{2})\.(\d{2})\b").unwrap();
    static ref LONG_DATE: Regex = Regex::new(r"\b(\d{4})\.(\d{2})\.(\d{2})\b").unwrap();
    static ref NON_ALPHANUMERIC: Regex = Regex::new(r"[^a-zA-Z0-9 ]+").unwrap();
    static ref SPACES: Regex = Regex::new(r" +").unwrap();
}

/// A file path split into lowercase components
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedPath {
    /// Directory components, outermost first
    pub paths: Vec<String>,
    /// File name without extension
    pub file: String,
    /// Extension including the leading dot, empty when there is none
    pub ext: String,
}

/// Split a Unix, Windows or UNC path into directories, stem and extension
pub fn parse_path(path: &str) -> ParsedPath {
    let lowered = path.to_lowercase();
    let mut components: Vec<&str> = lowered
        .split(['/', '\\'])
        .filter(|c| !c.is_empty() && *c != "." && *c != "..")
        .collect();

    if components.first().map_or(false, |c| DRIVE_LETTER.is_match(c)) {
        components.remove(0);
    }

    let Some(filename) = components.pop() else {
        return ParsedPath::default();
    };

    let (file, ext) = match filename.rfind('.') {
        Some(dot) if dot > 0 => (&filename[..dot], &filename[dot..]),
        _ => (filename, ""),
    };

    ParsedPath {
        paths: components.into_iter().map(str::to_string).collect(),
        file: file.to_string(),
        ext: ext.to_string(),
    }
}

/// Build the default query string of a scene
///
/// # Arguments
/// * `scene` - Stored scene, used for its metadata
/// * `paths` - Directory components of the scene's file
/// * `file` - File name without extension
/// * `mode` - How to derive the query
/// * `blacklist` - Case-insensitive patterns replaced with a space
pub fn prepare_query_string(
    scene: &StoredScene,
    paths: &[String],
    file: &str,
    mode: ParseMode,
    blacklist: &[String],
) -> String {
    let use_metadata = mode == ParseMode::Metadata
        || (mode == ParseMode::Auto && scene.date.is_some() && scene.studio_name.is_some());

    if use_metadata {
        let title = scene
            .title
            .as_deref()
            .map(|t| NON_ALPHANUMERIC.replace_all(t, "").into_owned())
            .unwrap_or_default();
        let parts = [
            scene.date.clone().unwrap_or_default(),
            scene.studio_name.clone().unwrap_or_default(),
            scene.performer_names.join(" "),
            title,
        ];
        let joined = parts
            .into_iter()
            .filter(|p| !p.is_empty())
            .collect::<Vec<_>>()
            .join(" ");
        return apply_blacklist(&joined, blacklist);
    }

    let base = match mode {
        ParseMode::Path => paths
            .iter()
            .map(String::as_str)
            .chain(std::iter::once(file))
            .collect::<Vec<_>>()
            .join(" "),
        ParseMode::Dir => paths.last().cloned().unwrap_or_default(),
        ParseMode::Auto | ParseMode::Filename | ParseMode::Metadata => file.to_string(),
    };

    let cleaned = parse_date(&apply_blacklist(&base, blacklist)).replace('.', " ");
    SPACES.replace_all(&cleaned, " ").trim().to_string()
}

/// Default query string of a scene under the given settings
pub fn default_query(scene: &StoredScene, config: &TaggerConfig) -> String {
    let parsed = parse_path(&scene.path);
    prepare_query_string(
        scene,
        &parsed.paths,
        &parsed.file,
        config.mode,
        &config.blacklist,
    )
}

fn apply_blacklist(input: &str, blacklist: &[String]) -> String {
    let mut output = input.to_string();
    for pattern in blacklist {
        match RegexBuilder::new(pattern).case_insensitive(true).build() {
            Ok(re) => output = re.replace_all(&output, " ").into_owned(),
            Err(e) => {
                tracing::warn!(pattern = %pattern, error = %e, "Skipping invalid blacklist pattern");
            }
        }
    }
    output
}

/// Expand dotted dates (`21.03.14`, `2021.03.14`) into ISO form
fn parse_date(input: &str) -> String {
    let expanded = SHORT_DATE.replace(input, " 20$1-$2-$3 ");
    LONG_DATE.replace(&expanded, " $1-$2-$3 ").into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn parsed(paths: &[&str], file: &str, ext: &str) -> ParsedPath {
        ParsedPath {
            paths: paths.iter().map(|s| s.to_string()).collect(),
            file: file.to_string(),
            ext: ext.to_string(),
        }
    }

    #[test]
    fn test_parse_path_empty() {
        assert_eq!(parse_path(""), ParsedPath::default());
    }

    #[test]
    fn test_parse_path_styles() {
        assert_eq!(
            parse_path("/home/user/videos/scene.mp4"),
            parsed(&["home", "user", "videos"], "scene", ".mp4")
        );
        assert_eq!(
            parse_path("C:\\Videos\\Studio\\scene.mp4"),
            parsed(&["videos", "studio"], "scene", ".mp4")
        );
        assert_eq!(
            parse_path("\\\\server\\share\\videos\\clip.mkv"),
            parsed(&["server", "share", "videos"], "clip", ".mkv")
        );
        assert_eq!(parse_path("/video.mp4"), parsed(&[], "video", ".mp4"));
    }

    #[test]
    fn test_parse_path_names() {
        assert_eq!(
            parse_path("/videos/scene.name.with.dots.mp4"),
            parsed(&["videos"], "scene.name.with.dots", ".mp4")
        );
        assert_eq!(
            parse_path("/videos/scenename"),
            parsed(&["videos"], "scenename", "")
        );
        assert_eq!(
            parse_path("/videos/../other/./scenes/clip.mp4"),
            parsed(&["videos", "other", "scenes"], "clip", ".mp4")
        );
        assert_eq!(
            parse_path("/Videos/STUDIO/Performer/Scene.MP4"),
            parsed(&["videos", "studio", "performer"], "scene", ".mp4")
        );
        for ext in [".mkv", ".avi", ".mov", ".wmv", ".webm"] {
            assert_eq!(parse_path(&format!("/v/a{}", ext)).ext, ext);
        }
    }

    fn blacklist() -> Vec<String> {
        TaggerConfig::default().blacklist
    }

    #[test]
    fn test_query_from_filename() {
        let scene = StoredScene::default();
        let query = prepare_query_string(
            &scene,
            &[],
            "studio.21.03.14.jane.doe.[1080p]",
            ParseMode::Auto,
            &blacklist(),
        );
        assert_eq!(query, "studio 2021-03-14 jane doe");
    }

    #[test]
    fn test_query_from_directories() {
        let scene = StoredScene::default();
        let paths = vec!["studio".to_string(), "jane.doe".to_string()];

        assert_eq!(
            prepare_query_string(&scene, &paths, "clip", ParseMode::Dir, &[]),
            "jane doe"
        );
        assert_eq!(
            prepare_query_string(&scene, &paths, "clip", ParseMode::Path, &[]),
            "studio jane doe clip"
        );
        assert_eq!(
            prepare_query_string(&scene, &[], "clip", ParseMode::Dir, &[]),
            ""
        );
    }

    #[test]
    fn test_query_from_metadata() {
        let scene = StoredScene {
            title: Some("Sunset, Part 2!".to_string()),
            date: Some("2021-03-14".to_string()),
            studio_name: Some("Studio A".to_string()),
            performer_names: vec!["Jane Doe".to_string()],
            ..Default::default()
        };

        assert_eq!(
            prepare_query_string(&scene, &[], "ignored", ParseMode::Auto, &[]),
            "2021-03-14 Studio A Jane Doe Sunset Part 2"
        );

        let undated = StoredScene {
            date: None,
            ..scene.clone()
        };
        assert_eq!(
            prepare_query_string(&undated, &[], "file", ParseMode::Auto, &[]),
            "file"
        );
        assert_eq!(
            prepare_query_string(&undated, &[], "file", ParseMode::Metadata, &[]),
            "Studio A Jane Doe Sunset Part 2"
        );
    }

    #[test]
    fn test_invalid_blacklist_pattern_is_skipped() {
        let scene = StoredScene::default();
        let patterns = vec!["(".to_string(), "xxx".to_string()];
        assert_eq!(
            prepare_query_string(&scene, &[], "a.XXX.b", ParseMode::Filename, &patterns),
            "a b"
        );
    }

    proptest! {
        #[test]
        fn prop_components_are_clean(path in r"[A-Za-z0-9./\\:]{0,40}") {
            let parsed = parse_path(&path);
            for component in &parsed.paths {
                prop_assert!(!component.is_empty());
                prop_assert!(component != "." && component != "..");
                prop_assert_eq!(component, &component.to_lowercase());
            }
            prop_assert_eq!(&parsed.file, &parsed.file.to_lowercase());
        }

        #[test]
        fn prop_unix_paths_split_back(
            dirs in proptest::collection::vec("[a-z0-9]{1,8}", 0..5),
            stem in "[a-z0-9]{1,8}",
            ext in "[a-z0-9]{1,4}",
        ) {
            let mut path = String::new();
            for dir in &dirs {
                path.push('/');
                path.push_str(dir);
            }
            path.push_str(&format!("/{}.{}", stem, ext));

            let parsed = parse_path(&path);
            prop_assert_eq!(parsed.paths, dirs);
            prop_assert_eq!(parsed.file, stem);
            prop_assert_eq!(parsed.ext, format!(".{}", ext));
        }
    }
}
