pub mod bigint;
pub mod modular;
pub mod primes;

pub use modular::{Barrett, add_mod, inv_mod, mul_mod, neg_mod, pow_mod, sub_mod};
pub use primes::{first_prime, is_prime, next_prime, previous_prime, root_of_unity};
