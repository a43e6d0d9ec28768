use commenter_core::model::{ImageEntry, SubmissionRequest};
use commenter_core::validation::{validate_submission, ValidationError};

fn complete_request() -> SubmissionRequest {
    SubmissionRequest {
        pr_number: Some(42),
        repository: Some("octo/widgets".into()),
        run_id: Some(9001),
        log_filename: Some("screenshots.txt".into()),
        images: Some(vec![ImageEntry {
            name: Some("home".into()),
            content: Some("aGVsbG8=".into()),
            sha: Some("2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824".into()),
        }]),
        installation_id: None,
    }
}

#[test]
fn accepts_complete_submission() {
    let sub = validate_submission(&complete_request()).unwrap();
    assert_eq!(sub.pr_number, 42);
    assert_eq!(sub.repository.to_string(), "octo/widgets");
    assert_eq!(sub.run_id, 9001);
    assert_eq!(sub.log_filename, "screenshots.txt");
    assert_eq!(sub.images.len(), 1);
    assert_eq!(sub.images[0].name, "home");
}

#[test]
fn names_each_missing_required_field() {
    let cases: Vec<(&str, fn(&mut SubmissionRequest))> = vec![
        ("pr_number", |r| r.pr_number = None),
        ("repository", |r| r.repository = None),
        ("run_id", |r| r.run_id = None),
        ("log_filename", |r| r.log_filename = None),
        ("images", |r| r.images = None),
    ];

    for (field, strip) in cases {
        let mut req = complete_request();
        strip(&mut req);
        let err = validate_submission(&req).unwrap_err();
        assert_eq!(err, ValidationError::MissingField(field));
        assert!(err.to_string().contains(field), "message should name {field}: {err}");
    }
}

#[test]
fn reports_first_missing_field_in_declaration_order() {
    let req = SubmissionRequest {
        log_filename: Some("x".into()),
        ..Default::default()
    };
    assert_eq!(
        validate_submission(&req).unwrap_err(),
        ValidationError::MissingField("pr_number")
    );
}

#[test]
fn rejects_image_without_content_or_sha() {
    let mut req = complete_request();
    req.images.as_mut().unwrap()[0].content = None;
    assert_eq!(
        validate_submission(&req).unwrap_err(),
        ValidationError::MissingImageField { index: 0, field: "content" }
    );

    let mut req = complete_request();
    req.images.as_mut().unwrap()[0].sha = None;
    let err = validate_submission(&req).unwrap_err();
    assert_eq!(err.to_string(), "missing required field: images[0].sha");
}

#[test]
fn rejects_path_like_claimed_sha() {
    let mut req = complete_request();
    req.images.as_mut().unwrap()[0].sha = Some("../other-bucket/x".into());
    assert_eq!(
        validate_submission(&req).unwrap_err(),
        ValidationError::InvalidImageField { index: 0, field: "sha" }
    );
}

#[test]
fn rejects_empty_image_list() {
    let mut req = complete_request();
    req.images = Some(vec![]);
    assert_eq!(validate_submission(&req).unwrap_err(), ValidationError::NoImages);
}

#[test]
fn rejects_malformed_repository() {
    let mut req = complete_request();
    req.repository = Some("widgets".into());
    assert!(matches!(
        validate_submission(&req).unwrap_err(),
        ValidationError::Repository(_)
    ));
}

#[test]
fn unnamed_image_falls_back_to_sha() {
    let mut req = complete_request();
    req.images.as_mut().unwrap()[0].name = None;
    let sub = validate_submission(&req).unwrap();
    assert_eq!(sub.images[0].name, sub.images[0].sha);
}

#[test]
fn installation_override_is_carried() {
    let mut req = complete_request();
    req.installation_id = Some(77);
    assert_eq!(validate_submission(&req).unwrap().installation_id, Some(77));
}

#[test]
fn submission_round_trips_through_staging_json() {
    let sub = validate_submission(&complete_request()).unwrap();
    let json = serde_json::to_string(&sub).unwrap();
    assert!(json.contains(r#""repository":"octo/widgets""#));
    let back: commenter_core::model::Submission = serde_json::from_str(&json).unwrap();
    assert_eq!(back, sub);
}
