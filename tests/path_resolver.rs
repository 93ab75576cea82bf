use stowage::config::StorageScheme;
use stowage::path::{CanonicalPath, PathResolver};
use stowage::Error;

const NONE: &[&str] = &[];

#[test]
fn test_templates_across_schemes() {
    for scheme in StorageScheme::ALL {
        let r = PathResolver::for_writer(scheme);
        let p = r.resolve(" /bucket/{}/{1}/{0}.json ", &["2024", "/q1/"]).unwrap();
        assert_eq!(p.as_str(), "/bucket/2024/q1/2024.json");

        let expected = if scheme == StorageScheme::Gcs {
            "bucket/2024/q1/2024.json"
        } else {
            "/bucket/2024/q1/2024.json"
        };
        assert_eq!(r.backend_path(&p), expected, "{scheme}");
    }
}

#[test]
fn test_literal_braces_survive() {
    let r = PathResolver::for_writer(StorageScheme::Memory);
    let p = r.resolve("/b/{{name}}-{}.txt", &["x"]).unwrap();
    assert_eq!(p.as_str(), "/b/{name}-x.txt");
}

#[test]
fn test_missing_fragment_is_a_format_error() {
    let r = PathResolver::for_writer(StorageScheme::File);
    let err = r.resolve("/b/{}/{}", &["only-one"]).unwrap_err();
    assert!(matches!(err, Error::Format { expected: 2, given: 1, .. }), "{err}");
}

#[test]
fn test_root_never_resolves() {
    for scheme in StorageScheme::ALL {
        for resolver in [
            PathResolver::for_reader(scheme),
            PathResolver::for_writer(scheme),
            PathResolver::for_directory(scheme),
        ] {
            for raw in ["", "/", " // ", "/./."] {
                assert!(
                    matches!(resolver.resolve(raw, NONE), Err(Error::InvalidPath { .. })),
                    "{scheme} {raw:?}"
                );
            }
            assert!(resolver.resolve("/{}", &["/"]).is_err());
        }
    }
}

#[test]
fn test_suffix_completion() {
    let r = PathResolver::for_reader(StorageScheme::S3);
    assert_eq!(r.resolve_suffix("/in/dir", "f.csv").unwrap().as_str(), "/in/dir/f.csv");
    assert_eq!(r.resolve_suffix("/in/dir", " /other/f.csv ").unwrap().as_str(), "/other/f.csv");
    assert_eq!(r.resolve_suffix("/in/dir/f.csv", "").unwrap().as_str(), "/in/dir/f.csv");
    assert!(r.resolve_suffix("/in", "").is_err());
    assert!(r.resolve_suffix("/in/dir", "../escape").is_err());
}

#[test]
fn test_canonical_path_navigation() {
    let p = CanonicalPath::parse("/a//b/./c.json").unwrap();
    assert_eq!(p.to_string(), "/a/b/c.json");
    assert_eq!(p.segments().collect::<Vec<_>>(), vec!["a", "b", "c.json"]);
    assert_eq!(p.parent().unwrap().join("d.json").unwrap().as_str(), "/a/b/d.json");
}
