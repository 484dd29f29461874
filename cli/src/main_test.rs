use clap::CommandFactory;

use super::*;

#[test]
fn cli_definition_is_consistent() {
    Cli::command().debug_assert();
}

#[test]
fn parses_emergency_register_with_urgency() {
    let cli = Cli::try_parse_from([
        "donation-cli",
        "emergency",
        "register",
        "--patient-name",
        "Trần Văn D",
        "--blood-type",
        "O-",
        "--units",
        "4",
        "--hospital",
        "Bệnh viện 115",
        "--phone",
        "0909123456",
        "--urgency",
        "critical",
    ])
    .unwrap();

    match cli.command {
        Command::Emergency(EmergencyCommand { command: EmergencySubcommand::Register { urgency, units, .. } }) => {
            assert_eq!(urgency, Urgency::Critical);
            assert_eq!(units, 4);
        }
        other => panic!("unexpected command: {other:?}"),
    }
}

#[test]
fn image_encode_defaults_to_base64() {
    let cli = Cli::try_parse_from(["donation-cli", "image", "encode", "logo.png"]).unwrap();
    match cli.command {
        Command::Image(ImageCommand { command: ImageSubcommand::Encode { mode, path } }) => {
            assert_eq!(mode, EncodeMode::Base64);
            assert_eq!(path, PathBuf::from("logo.png"));
        }
        other => panic!("unexpected command: {other:?}"),
    }
}

#[test]
fn rejects_unknown_encode_mode() {
    assert!(Cli::try_parse_from(["donation-cli", "image", "encode", "a.png", "--mode", "hex"]).is_err());
}

#[test]
fn cli_error_codes_follow_api_error() {
    let err = CliError::from(ApiError::from_status(404, &Value::Null));
    assert_eq!(err.code(), "E_HTTP_STATUS");
    assert_eq!(err.to_string(), donation_portal::error::MSG_NOT_FOUND);
}

#[test]
fn validation_error_lists_each_field() {
    use donation_portal::forms::{LoginForm, Validate};

    let errors = LoginForm::default().validate().unwrap_err();
    let err = CliError::from(ApiError::Validation(errors));
    let text = err.to_string();

    assert_eq!(err.code(), "E_VALIDATION");
    assert!(text.starts_with(donation_portal::error::MSG_VALIDATION));
    assert!(text.contains("password is required"), "{text}");
    assert!(text.contains("username is required"), "{text}");
}
