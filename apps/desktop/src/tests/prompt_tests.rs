use super::*;

#[test]
fn accepts_explicit_yes_only() {
    for answer in ["y\n", "Y", " yes ", "YES\r\n", "はい\n"] {
        assert!(is_affirmative(answer), "{answer:?} should confirm");
    }
    for answer in ["", "\n", "n", "no", "yep", "いいえ"] {
        assert!(!is_affirmative(answer), "{answer:?} should decline");
    }
}
