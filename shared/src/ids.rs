use rand::distr::Alphanumeric;
use rand::Rng;

pub const ID_LEN: usize = 12;

pub fn make_id() -> String {
    let mut rng = rand::rng();
    (0..ID_LEN).map(|_| rng.sample(Alphanumeric) as char).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_alphanumeric_and_distinct() {
        let first = make_id();
        let second = make_id();
        assert_eq!(first.len(), ID_LEN);
        assert!(first.chars().all(|ch| ch.is_ascii_alphanumeric()));
        assert_ne!(first, second);
    }
}
