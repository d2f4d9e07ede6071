use super::*;

#[test]
fn test_released_handles_go_stale() -> Result<()> {
    let arena = Arena::new("test");
    let first = arena.insert("a")?;
    assert_eq!(arena.get(first)?, "a", "live handle");

    assert_eq!(arena.remove(first)?, "a", "released value");
    assert!(
        matches!(arena.get(first), Err(FfiError::StaleHandle("test"))),
        "released handle"
    );
    assert!(
        matches!(arena.remove(first), Err(FfiError::StaleHandle("test"))),
        "double release"
    );

    let second = arena.insert("b")?;
    assert_ne!(first, second, "slot reuse bumps the generation");
    assert_eq!(unpack(first).0, unpack(second).0, "same slot");
    assert!(arena.get(first).is_err(), "old id does not reach the new value");
    assert_eq!(arena.get(second)?, "b", "new id does");

    Ok(())
}

#[test]
fn test_zeroed_handle_is_invalid() -> Result<()> {
    let arena = Arena::new("test");
    arena.insert(1u8)?;
    assert!(arena.get(0).is_err(), "generation 0 is never handed out");

    Ok(())
}
