#[cfg(test)]
mod tests {
    use crate::virtual_machine::isa::{FUNCTION_SLOTS, FUNCTION_TABLE, Function};

    const FNV_OFFSET: u64 = 0xcbf29ce484222325;
    const FNV_PRIME: u64 = 0x100000001b3;
    const EXPECTED_FUNCTION_TABLE_HASH: u64 = 17606758649380789555;

    fn fnv1a64(mut h: u64, bytes: &[u8]) -> u64 {
        for b in bytes {
            h ^= *b as u64;
            h = h.wrapping_mul(FNV_PRIME);
        }
        h
    }

    macro_rules! hash_functions {
        (
            $( $(#[$doc:meta])* $name:ident = $slot:expr, $mnemonic:literal ),* $(,)?
        ) => {{
            let mut h = FNV_OFFSET;
            $(
                h = fnv1a64(h, stringify!($name).as_bytes());
                h = fnv1a64(h, &[Function::$name as u8]);
                h = fnv1a64(h, $mnemonic.as_bytes());
            )*
            h = fnv1a64(h, b"Unused");
            let unused: Vec<u8> = (0..FUNCTION_SLOTS as u8)
                .filter(|slot| FUNCTION_TABLE[*slot as usize].is_none())
                .collect();
            fnv1a64(h, &unused)
        }};
    }

    fn current_function_table_hash() -> u64 {
        crate::for_each_function!(hash_functions)
    }

    #[test]
    #[ignore]
    fn print_function_table_hash() {
        println!("FUNCTION_TABLE_HASH={}", current_function_table_hash());
    }

    /// Slot numbers are baked into every assembled ROM; renumbering breaks them.
    #[test]
    fn function_table_hash_unchanged() {
        assert_eq!(current_function_table_hash(), EXPECTED_FUNCTION_TABLE_HASH);
    }
}
