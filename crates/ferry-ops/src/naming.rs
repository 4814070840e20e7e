//! Target name generation: duplicates, links, new items and filesystem
//! specific sanitizing.

use std::ffi::{OsStr, OsString};

use ferry_core::{FileSystem, Location};

/// Characters FAT-family filesystems refuse in names.
const FAT_FORBIDDEN_CHARACTERS: &[char] = &['/', ':', ';', '*', '?', '"', '<', '>'];

/// Filesystem types that need FAT sanitizing.
const FAT_FILESYSTEMS: &[&str] = &["fat", "vfat", "msdos", "msdosfs"];

/// Upper bound for a parsed duplicate counter.
const MAX_DUPLICATE_COUNT: u32 = 1_000_000;

/// Default name of a new folder.
pub const UNTITLED_FOLDER: &str = "untitled folder";

/// Default name of a new empty file.
pub const NEW_FILE: &str = "new file";

/// Drop `reduce_by` bytes from the end of `base`, never splitting a
/// character. Returns `None` if nothing would be left.
pub fn shorten_utf8(base: &str, reduce_by: usize) -> Option<String> {
    let target = base.len().checked_sub(reduce_by)?;
    let mut end = target;
    while end > 0 && !base.is_char_boundary(end) {
        end -= 1;
    }
    if end == 0 {
        return None;
    }
    Some(base[..end].to_string())
}

/// English ordinal suffix for `n`.
fn ordinal_suffix(n: u32) -> &'static str {
    if (11..=13).contains(&(n % 100)) {
        return "th";
    }
    match n % 10 {
        1 => "st",
        2 => "nd",
        3 => "rd",
        _ => "th",
    }
}

/// Shorten the variable part of a generated name until the whole fits in
/// `max_length` bytes.
fn fit_to_length(part: &str, render: impl Fn(&str) -> String, max_length: Option<usize>) -> String {
    let full = render(part);
    let Some(max) = max_length else {
        return full;
    };
    if full.len() <= max {
        return full;
    }
    match shorten_utf8(part, full.len() - max) {
        Some(short) => render(&short),
        None => full,
    }
}

/// Name of the `count`th link to `name`.
///
/// Count 0 keeps the name itself (linking into another directory).
pub fn link_name(name: &str, count: u32, max_length: Option<usize>) -> String {
    let render = |name: &str| match count {
        0 => name.to_string(),
        1 => format!("Link to {name}"),
        2 => format!("Another link to {name}"),
        n => format!("{n}{} link to {name}", ordinal_suffix(n)),
    };
    fit_to_length(name, render, max_length)
}

/// Split a name into `(base, suffix, count)` where `count` is the duplicate
/// counter already present in the name.
fn parse_previous_duplicate_name(name: &str) -> (String, String, u32) {
    // The suffix starts at the first '.' after the first character.
    let suffix_pos = name
        .char_indices()
        .skip(1)
        .find(|(_, c)| *c == '.')
        .map(|(i, _)| i)
        .filter(|&i| i + 1 < name.len());

    let tagged = [(" (copy)", Some(1)), (" (another copy)", Some(2))]
        .into_iter()
        .chain(
            ["th copy)", "st copy)", "nd copy)", "rd copy)"]
                .into_iter()
                .map(|tag| (tag, None)),
        )
        .find_map(|(tag, count)| name.find(tag).map(|pos| (pos, count)));

    let Some((tag_pos, fixed_count)) = tagged else {
        let (base, suffix) = match suffix_pos {
            Some(pos) => (&name[..pos], &name[pos..]),
            None => (name, ""),
        };
        return (base.to_string(), suffix.to_string(), 0);
    };

    let suffix = match suffix_pos {
        Some(pos) if pos > tag_pos => name[pos..].to_string(),
        _ => String::new(),
    };

    match fixed_count {
        Some(count) => (name[..tag_pos].to_string(), suffix, count),
        None => {
            let Some(open) = name.find(" (") else {
                return (name.to_string(), suffix, 0);
            };
            let digits: String = name[open + 2..]
                .chars()
                .take_while(|c| c.is_ascii_digit())
                .collect();
            let count = digits
                .parse::<u32>()
                .ok()
                .filter(|n| (1..=MAX_DUPLICATE_COUNT).contains(n))
                .unwrap_or(0);
            (name[..open].to_string(), suffix, count)
        }
    }
}

fn make_next_duplicate_name(base: &str, suffix: &str, count: u32, max_length: Option<usize>) -> String {
    let count = count.max(1);
    let render = |base: &str| match count {
        1 => format!("{base} (copy){suffix}"),
        2 => format!("{base} (another copy){suffix}"),
        n => format!("{base} ({n}{} copy){suffix}", ordinal_suffix(n)),
    };
    fit_to_length(base, render, max_length)
}

/// The name `count_increment` steps after `name` in the duplicate sequence
/// `foo.txt`, `foo (copy).txt`, `foo (another copy).txt`, `foo (3rd copy).txt`...
pub fn duplicate_name(name: &str, count_increment: u32, max_length: Option<usize>) -> String {
    let (base, suffix, count) = parse_previous_duplicate_name(name);
    make_next_duplicate_name(&base, &suffix, count + count_increment, max_length)
}

/// Name of the `count`th new folder: `untitled folder`, `untitled folder 2`...
pub fn numbered_name(name: &str, count: u32, max_length: Option<usize>) -> String {
    if count <= 1 {
        return name.to_string();
    }
    fit_to_length(name, |name| format!("{name} {count}"), max_length)
}

fn is_fat(fs_type: Option<&str>) -> bool {
    fs_type.is_some_and(|fs_type| FAT_FILESYSTEMS.contains(&fs_type))
}

/// Adapt `name` to the destination filesystem. Returns whether it changed.
pub fn make_valid_for_fs(name: &mut String, fs_type: Option<&str>) -> bool {
    if !is_fat(fs_type) {
        return false;
    }

    let original = name.clone();
    let replaced: String = name
        .chars()
        .map(|c| if FAT_FORBIDDEN_CHARACTERS.contains(&c) { '_' } else { c })
        .collect();
    *name = if replaced.chars().any(|c| c != ' ') {
        replaced.trim_end().to_string()
    } else {
        replaced
    };
    *name != original
}

/// Check a user-supplied name before renaming or creating.
pub fn validate_filename(name: &str) -> Result<(), String> {
    if name.is_empty() {
        return Err("Name cannot be empty".into());
    }
    if name == "." || name == ".." {
        return Err("'.' and '..' are reserved names".into());
    }
    if name.len() > 255 {
        return Err("Name is too long (max 255 characters)".into());
    }
    for c in ['/', '\0'] {
        if name.contains(c) {
            return Err(format!("Name cannot contain '{}'", c.escape_default()));
        }
    }
    if name.starts_with(' ') || name.ends_with(' ') {
        return Err("Name cannot start or end with spaces".into());
    }
    if name.ends_with('.') {
        return Err("Name cannot end with a dot".into());
    }
    Ok(())
}

fn source_name(src: &Location) -> String {
    src.file_name()
        .map(str::to_string)
        .unwrap_or_else(|| src.display_name())
}

/// The on-disk name of `src` when it is not UTF-8 and can be kept as is.
///
/// FAT-family filesystems store UTF-16 names, so those always get the
/// sanitized lossy name instead.
fn raw_source_name<'a>(src: &'a Location, fs_type: Option<&str>) -> Option<&'a OsStr> {
    if src.file_name().is_some() || is_fat(fs_type) {
        return None;
    }
    src.path().file_name()
}

fn join_os(parts: [&OsStr; 2]) -> OsString {
    let mut joined = OsString::from(parts[0]);
    joined.push(parts[1]);
    joined
}

/// Target for `src` inside `dest_dir`, keeping its name.
pub fn target_file(src: &Location, dest_dir: &Location, fs_type: Option<&str>) -> Location {
    if let Some(raw) = raw_source_name(src, fs_type) {
        return dest_dir.child(raw);
    }
    let mut name = source_name(src);
    make_valid_for_fs(&mut name, fs_type);
    dest_dir.child(name)
}

/// Target inside `dest_dir` for a name the user typed.
///
/// Returns `None` when the name is not a single valid path component.
pub fn target_for_display_name(dest_dir: &Location, name: &str, fs_type: Option<&str>) -> Option<Location> {
    if validate_filename(name).is_err() {
        return None;
    }
    let mut name = name.to_string();
    make_valid_for_fs(&mut name, fs_type);
    Some(dest_dir.child(name))
}

/// The `count`th duplicate of `src` inside `dest_dir`.
///
/// `count` is advanced past every candidate that already exists, so the
/// result never names an existing entry.
pub fn unique_target_file(
    fs: &dyn FileSystem,
    src: &Location,
    dest_dir: &Location,
    fs_type: Option<&str>,
    count: &mut u32,
) -> Location {
    let raw = raw_source_name(src, fs_type);
    let name = source_name(src);
    let max_length = fs.max_name_length(dest_dir);
    loop {
        let target = match raw {
            // Non-UTF-8 names keep their bytes and get the tag appended.
            Some(raw) => {
                let tag = make_next_duplicate_name("", "", *count, None);
                dest_dir.child(join_os([raw, OsStr::new(&tag)]))
            }
            None => {
                let mut candidate = duplicate_name(&name, *count, max_length);
                make_valid_for_fs(&mut candidate, fs_type);
                dest_dir.child(candidate)
            }
        };
        *count += 1;
        if !fs.exists(&target) {
            return target;
        }
    }
}

/// Target of the `count`th link to `src` inside `dest_dir`.
pub fn link_target_file(
    fs: &dyn FileSystem,
    src: &Location,
    dest_dir: &Location,
    fs_type: Option<&str>,
    count: u32,
) -> Location {
    if let Some(raw) = raw_source_name(src, fs_type) {
        let prefix = link_name("", count, None);
        return dest_dir.child(join_os([OsStr::new(&prefix), raw]));
    }
    let mut name = link_name(&source_name(src), count, fs.max_name_length(dest_dir));
    make_valid_for_fs(&mut name, fs_type);
    dest_dir.child(name)
}

/// Drop every location that has an ancestor in the same list.
pub fn top_level(locations: &[Location]) -> Vec<Location> {
    locations
        .iter()
        .filter(|loc| !locations.iter().any(|other| other.is_ancestor_of(loc)))
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use ferry_core::LocalFileSystem;
    use tempfile::TempDir;

    #[test]
    fn test_duplicate_sequence() {
        assert_eq!(duplicate_name("foo.txt", 1, None), "foo (copy).txt");
        assert_eq!(duplicate_name("foo (copy).txt", 1, None), "foo (another copy).txt");
        assert_eq!(duplicate_name("foo (another copy).txt", 1, None), "foo (3rd copy).txt");
        assert_eq!(duplicate_name("foo (3rd copy).txt", 1, None), "foo (4th copy).txt");
        assert_eq!(duplicate_name("foo (10th copy).txt", 1, None), "foo (11th copy).txt");
        assert_eq!(duplicate_name("foo (20th copy).txt", 1, None), "foo (21st copy).txt");
        assert_eq!(duplicate_name("foo (111th copy)", 1, None), "foo (112th copy)");
    }

    #[test]
    fn test_duplicate_suffix_rules() {
        assert_eq!(duplicate_name(".bashrc", 1, None), ".bashrc (copy)");
        assert_eq!(duplicate_name("archive.tar.gz", 1, None), "archive (copy).tar.gz");
        assert_eq!(duplicate_name("trailing.", 1, None), "trailing. (copy)");
        assert_eq!(duplicate_name("noext", 2, None), "noext (another copy)");
    }

    #[test]
    fn test_duplicate_is_shortened() {
        let name = duplicate_name("abcdefghij.txt", 1, Some(16));
        assert_eq!(name, "abcde (copy).txt");
        assert!(name.len() <= 16);
    }

    #[test]
    fn test_link_names() {
        assert_eq!(link_name("foo", 0, None), "foo");
        assert_eq!(link_name("foo", 1, None), "Link to foo");
        assert_eq!(link_name("foo", 2, None), "Another link to foo");
        assert_eq!(link_name("foo", 3, None), "3rd link to foo");
        assert_eq!(link_name("foo", 12, None), "12th link to foo");
        assert_eq!(link_name("foo", 22, None), "22nd link to foo");
    }

    #[test]
    fn test_shorten_utf8_respects_boundaries() {
        assert_eq!(shorten_utf8("héllo", 4).as_deref(), Some("h"));
        assert_eq!(shorten_utf8("abc", 3), None);
        assert_eq!(shorten_utf8("abc", 10), None);
    }

    #[test]
    fn test_fat_sanitizing() {
        let mut name = String::from("a:b?c  ");
        assert!(make_valid_for_fs(&mut name, Some("vfat")));
        assert_eq!(name, "a_b_c");

        let mut name = String::from("a:b");
        assert!(!make_valid_for_fs(&mut name, Some("ext4")));
        assert!(!make_valid_for_fs(&mut name, None));
        assert_eq!(name, "a:b");
    }

    #[test]
    fn test_numbered_names() {
        assert_eq!(numbered_name(UNTITLED_FOLDER, 1, None), "untitled folder");
        assert_eq!(numbered_name(UNTITLED_FOLDER, 2, None), "untitled folder 2");
    }

    #[test]
    fn test_validate_filename() {
        assert!(validate_filename("test.txt").is_ok());
        assert!(validate_filename(".hidden").is_ok());
        assert!(validate_filename("").is_err());
        assert!(validate_filename("a/b").is_err());
        assert!(validate_filename("..").is_err());
        assert!(validate_filename(" x").is_err());
        assert!(validate_filename("x.").is_err());
    }

    #[test]
    fn test_unique_target_skips_existing() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("a.txt"), "").unwrap();
        std::fs::write(temp.path().join("a (copy).txt"), "").unwrap();
        std::fs::write(temp.path().join("a (another copy).txt"), "").unwrap();

        let fs = LocalFileSystem::new();
        let dir = Location::local(temp.path());
        let mut count = 1;
        let target = unique_target_file(&fs, &dir.child("a.txt"), &dir, None, &mut count);
        assert_eq!(target, dir.child("a (3rd copy).txt"));
        assert_eq!(count, 4);
    }

    #[test]
    fn test_typed_name_stays_in_folder() {
        let dir = Location::local("/dst");
        assert_eq!(
            target_for_display_name(&dir, "b.txt", None),
            Some(Location::local("/dst/b.txt"))
        );
        assert_eq!(
            target_for_display_name(&dir, "a:b", Some("vfat")),
            Some(Location::local("/dst/a_b"))
        );
        assert_eq!(target_for_display_name(&dir, "/tmp/outside.txt", None), None);
        assert_eq!(target_for_display_name(&dir, "../outside.txt", None), None);
        assert_eq!(target_for_display_name(&dir, "..", None), None);
        assert_eq!(target_for_display_name(&dir, "", None), None);
    }

    #[cfg(unix)]
    #[test]
    fn test_non_utf8_names_keep_their_bytes() {
        use std::os::unix::ffi::OsStrExt;

        let raw = OsStr::from_bytes(b"bad\xff.txt");
        let src = Location::local("/src").child(raw);
        let dest_dir = Location::local("/dst");

        assert_eq!(target_file(&src, &dest_dir, None), dest_dir.child(raw));

        let temp = TempDir::new().unwrap();
        let fs = LocalFileSystem::new();
        let dir = Location::local(temp.path());
        let mut count = 1;
        let duplicate = unique_target_file(&fs, &src, &dir, None, &mut count);
        assert_eq!(duplicate, dir.child(OsStr::from_bytes(b"bad\xff.txt (copy)")));

        let link = link_target_file(&fs, &src, &dir, None, 1);
        assert_eq!(link, dir.child(OsStr::from_bytes(b"Link to bad\xff.txt")));
    }

    #[test]
    fn test_top_level_drops_descendants() {
        let a = Location::local("/x/a");
        let b = Location::local("/x/a/b");
        let c = Location::local("/x/c");
        assert_eq!(top_level(&[a.clone(), b, c.clone()]), vec![a, c]);
    }
}
