//! Digest header codec tests
//!
//! Exercises the challenge/answer exchange the way a registrar and a user
//! agent use it: the server renders a challenge, the client parses it and
//! answers, the server parses the answer and verifies it.

use proptest::prelude::*;

use sipline_auth_core::{AuthError, Challenge, Credentials};

#[test]
fn test_challenge_answer_verify_exchange() {
    let challenge = Challenge::new("example.com");
    let wire = challenge.to_string();

    let received = Challenge::from_header(&wire).expect("challenge should parse");
    assert_eq!(received, challenge);

    let answer = Credentials::from_authenticate_header(
        &received,
        "REGISTER",
        "sip:example.com",
        "alice",
        "hunter2",
    )
    .expect("digest challenge should be answerable");
    let answer_wire = answer.to_string();
    assert!(answer_wire.starts_with("Digest username=\"alice\",uri=\"sip:example.com\""));

    let parsed_answer = Credentials::from_header(&answer_wire).expect("answer should parse");
    assert_eq!(parsed_answer, answer);
    assert_eq!(parsed_answer.nonce, challenge.nonce);
    assert!(parsed_answer.verify("REGISTER", "hunter2"));
    assert!(!parsed_answer.verify("REGISTER", "wrong"));
    assert!(!parsed_answer.verify("INVITE", "hunter2"));
}

#[test]
fn test_challenge_from_foreign_server_formatting() {
    // Spaces after commas and an unquoted stale flag are common in the wild
    let header = r#"Digest realm="asterisk", nonce="4f1b2c", opaque="xyz", algorithm=MD5, qop="auth", stale=TRUE"#;
    let challenge: Challenge = header.parse().unwrap();

    assert_eq!(challenge.realm, "asterisk");
    assert_eq!(challenge.nonce, "4f1b2c");
    assert_eq!(challenge.opaque, "xyz");
    assert_eq!(challenge.algorithm, "MD5");
    assert!(challenge.stale);
}

#[test]
fn test_credentials_missing_response() {
    let err = Credentials::from_header(r#"Digest username="a",uri="u",realm="r",nonce="n""#)
        .unwrap_err();
    assert_eq!(err, AuthError::MissingParameter("response"));
}

#[test]
fn test_malformed_parameter() {
    let err = Challenge::from_header(r#"Digest realm="r",garbage"#).unwrap_err();
    assert!(matches!(err, AuthError::MalformedParameter(p) if p == "garbage"));
}

proptest! {
    #[test]
    fn test_challenge_survives_rendering(
        realm in "[a-zA-Z0-9.-]{1,24}",
        nonce in "[a-f0-9]{1,64}",
        opaque in "[a-f0-9]{1,64}",
        stale in any::<bool>(),
    ) {
        let challenge = Challenge::new(realm)
            .with_nonce(nonce)
            .with_opaque(opaque)
            .with_stale(stale);
        let parsed = Challenge::from_header(&challenge.to_string()).unwrap();
        prop_assert_eq!(parsed, challenge);
    }
}
