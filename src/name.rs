//! Wildcard endpoint name resolution.

use rand::RngCore;

/// Resolve a wildcard template into a concrete candidate name.
///
/// If `template` has no `*` or `random_bytes == 0`, the template is returned unchanged.
/// Otherwise `random_bytes` bytes are drawn from a cryptographic random source, hex-encoded,
/// and substituted for every `*` in the template.
///
/// Resolution happens once per call; a collision with an existing name is the command loop's
/// concern to report as `EndpointExists`, not this function's. Retrying on collision here would
/// couple name generation to the registry and to the random source, which is deliberately
/// avoided.
pub fn resolve(template: &str, random_bytes: usize) -> String {
    resolve_with(template, random_bytes, &mut rand::thread_rng())
}

/// Same as [`resolve`] but with an injectable random source, so tests can be deterministic.
pub fn resolve_with(template: &str, random_bytes: usize, rng: &mut impl RngCore) -> String {
    if random_bytes == 0 || !template.contains('*') {
        return template.to_string();
    }

    let mut bytes = vec![0u8; random_bytes];
    rng.fill_bytes(&mut bytes);
    let suffix = hex::encode(bytes);
    template.replace('*', &suffix)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    #[test]
    fn verbatim_without_wildcard() {
        assert_eq!(resolve("fixed-name", 16), "fixed-name");
    }

    #[test]
    fn verbatim_with_zero_random_bytes() {
        assert_eq!(resolve("prefix-*", 0), "prefix-*");
    }

    #[test]
    fn substitutes_every_asterisk() {
        let mut rng = rand_chacha::ChaCha8Rng::seed_from_u64(42);
        let a = resolve_with("*-*", 4, &mut rng);
        let (left, right) = a.split_once('-').unwrap();
        assert_eq!(left.len(), 8);
        assert_eq!(left, right);
    }

    #[test]
    fn deterministic_with_fixed_seed() {
        let mut rng_a = rand_chacha::ChaCha8Rng::seed_from_u64(7);
        let mut rng_b = rand_chacha::ChaCha8Rng::seed_from_u64(7);
        assert_eq!(
            resolve_with("user-*", 16, &mut rng_a),
            resolve_with("user-*", 16, &mut rng_b)
        );
    }

    #[test]
    fn hex_length_matches_requested_bytes() {
        let mut rng = rand_chacha::ChaCha8Rng::seed_from_u64(1);
        let name = resolve_with("*", 16, &mut rng);
        assert_eq!(name.len(), 32);
    }
}
