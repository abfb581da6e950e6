use tier_fs::{NAME_MAX, Path, components};

#[test]
fn validity() {
    assert!("/a/b".is_valid());
    assert!("a".is_valid());
    assert!("".is_valid());
    // 连续分隔符产生的空组件按无操作容忍
    assert!("a//b".is_valid());
    assert!("/a/b/".is_valid());

    let longest = "x".repeat(NAME_MAX);
    assert!(format!("/{longest}").as_str().is_valid());
    let over = "x".repeat(NAME_MAX + 1);
    assert!(!format!("/{over}").as_str().is_valid());
    assert!(!format!("/ok/{over}/tail").as_str().is_valid());
}

#[test]
fn split() {
    assert_eq!("/a/b".parent_file(), Some(("/a", "b")));
    assert_eq!("/a".parent_file(), Some(("/", "a")));
    assert_eq!("a".parent_file(), Some(("", "a")));
    assert_eq!("d/e/f".parent_file(), Some(("d/e", "f")));
    // 叶名是最后一个非空组件
    assert_eq!("/a/b/".parent_file(), Some(("/a", "b")));

    assert_eq!("/".parent_file(), None);
    assert_eq!("".parent_file(), None);
    assert_eq!("//".parent_file(), None);
}

#[test]
fn component_iteration() {
    let cmps: Vec<_> = components("/a//b/c/").collect();
    assert_eq!(cmps, ["a", "b", "c"]);
    assert_eq!(components("/").count(), 0);
}
