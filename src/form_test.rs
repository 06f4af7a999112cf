use super::*;
use pretty_assertions::assert_eq;

fn input(kind: &str) -> ElementSnapshot {
    ElementSnapshot::new("input").with_attribute("type", kind)
}

fn in_form(snapshot: ElementSnapshot, form_index: usize) -> ElementSnapshot {
    snapshot
        .with_ancestor(AncestorNode::new("html"))
        .with_ancestor(AncestorNode::new("body"))
        .with_ancestor(AncestorNode::new("form").nth(form_index))
}

#[test]
fn test_classify_by_type() {
    assert_eq!(classify(&input("password")), SemanticField::Password);
    assert_eq!(classify(&input("email")), SemanticField::Email);
    assert_eq!(classify(&input("tel")), SemanticField::Phone);
    assert_eq!(classify(&ElementSnapshot::new("textarea")), SemanticField::Message);
    assert_eq!(classify(&input("submit")), SemanticField::Submit);
    assert_eq!(classify(&input("checkbox")), SemanticField::Unknown);
}

#[test]
fn test_classify_by_evidence() {
    let user = input("text").with_attribute("name", "username");
    assert_eq!(classify(&user), SemanticField::Name);

    let mail = input("text").with_attribute("placeholder", "Your e-mail");
    assert_eq!(classify(&mail), SemanticField::Email);

    let pwd = input("text").with_label("Password");
    assert_eq!(classify(&pwd), SemanticField::Password);

    let mobile = input("text").with_attribute("id", "mobileNumber");
    assert_eq!(classify(&mobile), SemanticField::Phone);

    let comment = input("text").with_attribute("name", "comment");
    assert_eq!(classify(&comment), SemanticField::Message);

    let coupon = input("text").with_attribute("name", "coupon");
    assert_eq!(classify(&coupon), SemanticField::Unknown);
}

#[test]
fn test_classification_order_password_before_name() {
    // "user_password" carries both name and password vocabulary
    let field = input("text").with_attribute("name", "user_password");
    assert_eq!(classify(&field), SemanticField::Password);
}

#[test]
fn test_classify_buttons() {
    assert_eq!(
        classify(&ElementSnapshot::new("button").with_text("Log in")),
        SemanticField::Submit
    );
    assert_eq!(
        classify(
            &ElementSnapshot::new("button")
                .with_attribute("type", "button")
                .with_text("Show password")
        ),
        SemanticField::Unknown
    );
    assert_eq!(
        classify(
            &ElementSnapshot::new("button")
                .with_attribute("type", "reset")
                .with_text("Clear")
        ),
        SemanticField::Unknown
    );
    assert_eq!(
        classify(
            &ElementSnapshot::new("div")
                .with_attribute("role", "button")
                .with_text("Continue")
        ),
        SemanticField::Submit
    );
}

#[test]
fn test_login_form_mapping() {
    let mapper = FormFieldMapper::default();
    let controls = vec![
        in_form(input("email").with_attribute("id", "email"), 1),
        in_form(input("password").with_attribute("id", "pwd"), 1),
        in_form(
            ElementSnapshot::new("button")
                .with_attribute("type", "submit")
                .with_text("Log in"),
            1,
        ),
    ];
    let map = mapper.classify_all(controls);

    assert_eq!(map.keys(), vec!["email", "password", "submit"]);
    assert!(map.unknown.is_empty());

    let email = map.get("email").unwrap();
    assert_eq!(email.kind, FieldKind::Email);
    assert_eq!(email.locators.best().unwrap().expression(), "#email");

    let password = map.get("password").unwrap();
    assert_eq!(password.kind, FieldKind::Password);
    assert_eq!(password.locators.best().unwrap().expression(), "#pwd");

    let submit = map.get("submit").unwrap();
    assert_eq!(submit.kind, FieldKind::SubmitButton);
    assert!(submit.locators.iter().any(|c| {
        c.strategy == crate::types::LocatorStrategy::TextContent
            && c.expression() == "//button[normalize-space(.)='Log in']"
    }));
}

#[test]
fn test_mapping_from_names_alone() {
    let mapper = FormFieldMapper::default();
    let map = mapper.classify_all(vec![
        input("text").with_attribute("name", "email"),
        input("text").with_attribute("name", "pwd"),
        ElementSnapshot::new("button").with_text("Log in"),
    ]);
    assert_eq!(map.keys(), vec!["email", "password", "submit"]);
    assert!(map.unknown.is_empty());
    assert_eq!(
        map.get("password").unwrap().locators.best().unwrap().expression(),
        "input[name=\"pwd\"]"
    );
}

#[test]
fn test_duplicate_fields_get_suffixes_and_unknowns_are_kept() {
    let mapper = FormFieldMapper::default();
    let controls = vec![
        input("text").with_attribute("name", "first_name"),
        input("text").with_attribute("name", "last_name"),
        input("checkbox").with_attribute("name", "terms").with_attribute("required", ""),
        input("hidden").with_attribute("name", "csrf"),
    ];
    let map = mapper.classify_all(controls);

    assert_eq!(map.keys(), vec!["name", "name_2"]);
    assert_eq!(map.unknown.len(), 1);
    let terms = &map.unknown[0];
    assert_eq!(terms.snapshot.attr("name"), Some("terms"));
    assert!(terms.required);
    assert!(!terms.locators.is_empty());
}

#[test]
fn test_first_form_group() {
    let controls = vec![
        input("text").with_attribute("name", "search"),
        in_form(input("email"), 1),
        in_form(input("password"), 1),
        in_form(input("email").with_attribute("name", "newsletter"), 2),
    ];
    let grouped = first_form_group(controls);
    assert_eq!(grouped.len(), 2);
    assert!(grouped.iter().all(|c| c.ancestors.iter().any(|a| a.tag == "form" && a.index_of_type == 1)));
}

#[test]
fn test_first_form_group_without_forms_keeps_everything() {
    let controls = vec![input("email"), input("password")];
    assert_eq!(first_form_group(controls).len(), 2);
}

#[test]
fn test_labels_fall_back_to_placeholder() {
    let mapper = FormFieldMapper::default();
    let map = mapper.classify_all(vec![
        input("email").with_label("Work email"),
        input("tel").with_attribute("placeholder", "Phone number"),
    ]);
    assert_eq!(map.get("email").unwrap().label.as_deref(), Some("Work email"));
    assert_eq!(map.get("phone").unwrap().label.as_deref(), Some("Phone number"));
}
