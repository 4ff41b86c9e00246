use rand::seq::SliceRandom;

/// Adjectives used when no `-n` flag is given (§6 [EXPANDED]). The original pulls a two-word
/// name from the `petname` package; this crate inlines a small equivalent list rather than take
/// on a dependency the rest of the pack never reaches for.
const ADJECTIVES: &[&str] = &[
    "quick", "sly", "bold", "calm", "eager", "gentle", "jolly", "lucky", "nimble", "plucky",
    "sturdy", "witty",
];

const ANIMALS: &[&str] = &[
    "otter", "falcon", "badger", "lynx", "heron", "marmot", "weasel", "gecko", "raven", "ibex",
    "tapir", "civet",
];

/// Generates a random `adjective-animal` name, e.g. `"bold-otter"`.
pub fn random_name() -> String {
    let mut rng = rand::thread_rng();
    let adjective = ADJECTIVES.choose(&mut rng).expect("ADJECTIVES is non-empty");
    let animal = ANIMALS.choose(&mut rng).expect("ANIMALS is non-empty");
    format!("{adjective}-{animal}")
}

#[cfg(test)]
mod namegen_tests {
    use super::*;

    #[test]
    fn test_random_name_has_two_hyphenated_parts() {
        let name = random_name();
        let parts: Vec<&str> = name.split('-').collect();
        assert_eq!(parts.len(), 2);
        assert!(ADJECTIVES.contains(&parts[0]));
        assert!(ANIMALS.contains(&parts[1]));
    }
}
