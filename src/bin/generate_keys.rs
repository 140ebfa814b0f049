use office_hours::auth::jwt::JwtConfig;

fn main() {
    let (private_key, public_key) = JwtConfig::generate_key_pair();

    println!("# Signing key for access and refresh tokens");
    println!("JWT_PRIVATE_KEY={private_key}");
    println!();
    println!("# Verification key for services that only check access tokens");
    println!("{public_key}");
}
