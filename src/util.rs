use rand::distributions::Alphanumeric;
use rand::Rng;

/// Random ASCII-alphabetic string of the given length.
pub(crate) fn random_alphabetic(len: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .map(char::from)
        .filter(char::is_ascii_alphabetic)
        .take(len)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generates_requested_length() {
        let s = random_alphabetic(500);
        assert_eq!(s.len(), 500);
        assert!(s.chars().all(|c| c.is_ascii_alphabetic()));
    }
}
