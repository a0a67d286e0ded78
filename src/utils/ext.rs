use crate::ast::Lang;
use std::path::Path;

/// Map a path's extension to a registered language.
pub fn language_for(path: &Path) -> Option<Lang> {
    path.extension().and_then(|s| match s.to_str()? {
        "c" | "h" => Some(Lang::C),
        "java" => Some(Lang::Java),
        _ => None,
    })
}

#[test]
fn header_files_count_as_c() {
    assert_eq!(language_for(Path::new("foo/bar.h")), Some(Lang::C));
    assert_eq!(language_for(Path::new("Main.java")), Some(Lang::Java));
    assert_eq!(language_for(Path::new("script.py")), None);
}
