// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::{Result, anyhow};
use parkpay_api::{Client, NewAccount, Recipient, SubscriptionSync, VehicleSync};
use parkpay_app::{
    Outcome, RemoteSync, RowKey, SubscriptionName, SyncScope, TableKind,
    VerificationFlow, VerifyChannel,
};
use std::collections::HashMap;
use std::io::{Read, Write};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tiny_http::{Header, Response, Server};

#[derive(Debug)]
struct Captured {
    method: String,
    url: String,
    content_type: String,
    body: String,
}

impl Captured {
    fn form(&self) -> HashMap<String, String> {
        url::form_urlencoded::parse(self.body.as_bytes())
            .into_owned()
            .collect()
    }
}

/// Answers each request in turn with the given status and JSON body.
fn serve(replies: Vec<(u16, &'static str)>) -> Result<(String, JoinHandle<Vec<Captured>>)> {
    let server =
        Server::http("127.0.0.1:0").map_err(|error| anyhow!("start mock server: {error}"))?;
    let addr = format!("http://{}", server.server_addr());

    let handle = thread::spawn(move || {
        let mut captured = Vec::new();
        for (status, reply) in replies {
            let mut request = server.recv().expect("request expected");
            let mut body = String::new();
            request
                .as_reader()
                .read_to_string(&mut body)
                .expect("readable request body");
            let content_type = request
                .headers()
                .iter()
                .find(|header| header.field.equiv("Content-Type"))
                .map(|header| header.value.as_str().to_owned())
                .unwrap_or_default();
            captured.push(Captured {
                method: request.method().as_str().to_owned(),
                url: request.url().to_owned(),
                content_type,
                body,
            });
            let response = Response::from_string(reply)
                .with_status_code(status)
                .with_header(
                    Header::from_bytes("Content-Type", "application/json")
                        .expect("valid content type header"),
                );
            request.respond(response).expect("response should succeed");
        }
        captured
    });

    Ok((addr, handle))
}

fn client(addr: &str) -> Result<Client> {
    Client::new(addr, "secret", Duration::from_secs(2))
}

#[test]
fn unreachable_server_error_names_the_config_key() {
    let client = Client::new("http://127.0.0.1:1", "secret", Duration::from_millis(100))
        .expect("client should initialize");

    let error = client
        .pay_plate("B123ABC")
        .expect_err("pay should fail for unreachable server");
    assert!(error.to_string().contains("api.base_url"));
}

#[test]
fn pay_plate_posts_form_with_api_key() -> Result<()> {
    let (addr, handle) = serve(vec![(200, r#"{"success":true,"message":"Paid 5 RON"}"#)])?;

    let outcome = client(&addr)?.pay_plate("B123ABC")?;
    assert_eq!(outcome, Outcome::Accepted("Paid 5 RON".to_owned()));

    let captured = handle.join().expect("server thread should join");
    assert_eq!(captured[0].method, "POST");
    assert_eq!(captured[0].url, "/api/endpoint");
    assert!(captured[0].content_type.starts_with("application/x-www-form-urlencoded"));
    let form = captured[0].form();
    assert_eq!(form.get("key").map(String::as_str), Some("secret"));
    assert_eq!(form.get("licensePlate").map(String::as_str), Some("B123ABC"));
    Ok(())
}

#[test]
fn pay_qr_code_uploads_multipart_image() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let image = dir.path().join("ticket.png");
    std::fs::File::create(&image)?.write_all(b"fake-png-bytes")?;

    let (addr, handle) = serve(vec![(200, r#"{"success":false,"message":"Unknown code"}"#)])?;
    let outcome = client(&addr)?.pay_qr_code(&image)?;
    assert_eq!(outcome, Outcome::Rejected(Some("Unknown code".to_owned())));

    let captured = handle.join().expect("server thread should join");
    assert!(captured[0].content_type.starts_with("multipart/form-data"));
    assert!(captured[0].body.contains("name=\"qrCodeImage\""));
    assert!(captured[0].body.contains("ticket.png"));
    assert!(captured[0].body.contains("fake-png-bytes"));
    assert!(captured[0].body.contains("name=\"key\""));
    Ok(())
}

#[test]
fn pay_qr_code_reports_missing_file() -> Result<()> {
    let client = client("http://127.0.0.1:1")?;
    let error = client
        .pay_qr_code(std::path::Path::new("/nonexistent/qr.png"))
        .expect_err("missing image should fail before sending");
    assert!(format!("{error:#}").contains("read QR code image"));
    Ok(())
}

#[test]
fn login_decodes_profile_and_subscriptions() -> Result<()> {
    let (addr, handle) = serve(vec![(
        200,
        r#"{"success":true,"name":"Ana","lastName":"Popescu","email":"ana@pop.ro",
            "phone":"0712345678","subscriptionsTable":[["Family"],["Work"]]}"#,
    )])?;

    let session = client(&addr)?
        .login("ana@pop.ro", "Secret123!")?
        .accepted()
        .ok_or_else(|| anyhow!("login should be accepted"))?;
    assert_eq!(session.profile.display_name(), "Ana Popescu");
    assert_eq!(session.subscriptions.len(), 2);
    assert_eq!(session.subscriptions[1].cell(0), "Work");

    let captured = handle.join().expect("server thread should join");
    let form = captured[0].form();
    assert_eq!(captured[0].url, "/api/login");
    assert_eq!(form.get("input").map(String::as_str), Some("ana@pop.ro"));
    assert_eq!(form.get("password").map(String::as_str), Some("Secret123!"));
    assert!(!form.contains_key("fromRedirect"));
    Ok(())
}

#[test]
fn relogin_sends_redirect_flag_without_password() -> Result<()> {
    let (addr, handle) = serve(vec![(200, r#"{"success":false}"#)])?;

    let outcome = client(&addr)?.relogin("ana@pop.ro")?;
    assert_eq!(outcome, Outcome::Rejected(None));

    let captured = handle.join().expect("server thread should join");
    let form = captured[0].form();
    assert_eq!(form.get("fromRedirect").map(String::as_str), Some("true"));
    assert!(!form.contains_key("password"));
    Ok(())
}

#[test]
fn verification_requests_follow_flow_and_channel() -> Result<()> {
    let (addr, handle) = serve(vec![
        (200, r#"{"success":true}"#),
        (200, r#"{"success":true}"#),
        (200, r#"{"success":true,"email":"ana@pop.ro"}"#),
        (200, r#"{"success":true}"#),
    ])?;
    let to = Recipient {
        name: "Ana".to_owned(),
        email: "ana@pop.ro".to_owned(),
        phone: "0712345678".to_owned(),
    };

    let client = client(&addr)?;
    client.send_code(VerificationFlow::Signup, VerifyChannel::Sms, &to)?;
    client.send_code(VerificationFlow::Recover, VerifyChannel::Email, &to)?;
    let email = client.check_token(VerificationFlow::Recover, "123456")?;
    assert_eq!(email, Outcome::Accepted(Some("ana@pop.ro".to_owned())));
    client.resend_code(VerificationFlow::Recover, &to)?;

    let captured = handle.join().expect("server thread should join");
    let urls = captured
        .iter()
        .map(|request| request.url.as_str())
        .collect::<Vec<_>>();
    assert_eq!(
        urls,
        vec![
            "/api/validateViaSMS",
            "/api/recoverPasswordViaEmail",
            "/api/verifyResetPasswordToken",
            "/api/resendRecoverPassword",
        ]
    );
    assert_eq!(
        captured[0].form().get("phone").map(String::as_str),
        Some("0712345678")
    );
    assert!(!captured[1].form().contains_key("phone"));
    assert_eq!(
        captured[2].form().get("token").map(String::as_str),
        Some("123456")
    );
    assert!(!captured[3].form().contains_key("email"));
    Ok(())
}

#[test]
fn create_account_sends_every_field() -> Result<()> {
    let (addr, handle) = serve(vec![(
        200,
        r#"{"success":false,"message":"Email already registered"}"#,
    )])?;

    let outcome = client(&addr)?.create_account(&NewAccount {
        name: "Ana",
        last_name: "Popescu",
        email: "ana@pop.ro",
        password: "Secret123!",
        phone: "0712345678",
    })?;
    assert_eq!(
        outcome,
        Outcome::Rejected(Some("Email already registered".to_owned()))
    );

    let captured = handle.join().expect("server thread should join");
    let form = captured[0].form();
    for field in ["key", "name", "lastName", "email", "password", "phone"] {
        assert!(form.contains_key(field), "missing {field}");
    }
    Ok(())
}

#[test]
fn non_success_status_is_a_transport_error() -> Result<()> {
    let (addr, handle) = serve(vec![(403, r#"{"message":"invalid key"}"#)])?;

    let error = client(&addr)?
        .subscribe_newsletter("ana@pop.ro")
        .expect_err("403 should be an error");
    assert_eq!(error.to_string(), "server error (403): invalid key");

    handle.join().expect("server thread should join");
    Ok(())
}

#[test]
fn subscription_sync_drives_subscription_endpoints() -> Result<()> {
    let (addr, handle) = serve(vec![
        (200, r#"{"success":true}"#),
        (
            200,
            r#"{"success":true,"vehiclesTable":[["B123ABC","2024-01-01","08:00","","","","","Active"]]}"#,
        ),
        (200, r#"{"success":false,"message":"Subscription has vehicles"}"#),
    ])?;
    let client = client(&addr)?;
    let mut sync = SubscriptionSync::new(&client);
    let scope = SyncScope::account("ana@pop.ro");
    let key = RowKey::from("Family");

    assert_eq!(sync.kind(), TableKind::Subscriptions);
    let created = sync.create(&scope, &key, &[])?;
    assert_eq!(created.accepted().map(|row| row.key()), Some(key.clone()));

    let children = sync
        .list_children(&scope, &key)?
        .accepted()
        .ok_or_else(|| anyhow!("vehicles should be listed"))?;
    assert_eq!(children[0].cell(0), "B123ABC");
    assert_eq!(children[0].cell(7), "Active");

    let deleted = sync.delete(&scope, &key)?;
    assert_eq!(
        deleted,
        Outcome::Rejected(Some("Subscription has vehicles".to_owned()))
    );
    assert!(!sync.get_history(&key)?.is_accepted());

    let captured = handle.join().expect("server thread should join");
    assert_eq!(captured[0].url, "/api/addSubscription");
    assert_eq!(
        captured[0].form().get("subscriptionName").map(String::as_str),
        Some("Family")
    );
    assert_eq!(captured[1].url, "/api/getSubscriptionVehicles");
    assert_eq!(captured[2].url, "/api/deleteSubscription");
    Ok(())
}

#[test]
fn vehicle_sync_sends_activity_and_reads_history() -> Result<()> {
    let (addr, handle) = serve(vec![
        (200, r#"{"success":true,"vehiclesTable":[["B123ABC","","","","","","","Inactive"]]}"#),
        (
            200,
            r#"{"success":true,"history":[["2024-01-02","09:00","11:00","2h"]],"totalTimeParked":"2h","payment":"5"}"#,
        ),
        (200, r#"{"success":true}"#),
    ])?;
    let client = client(&addr)?;
    let mut sync = VehicleSync::new(&client);
    let scope = SyncScope::subscription("ana@pop.ro", SubscriptionName::from("Family"));
    let key = RowKey::from("B123ABC");

    let row = sync
        .create(&scope, &key, &["note".to_owned()])?
        .accepted()
        .ok_or_else(|| anyhow!("vehicle should be created"))?;
    assert_eq!(row.cell(7), "Inactive");

    let page = sync
        .get_history(&key)?
        .accepted()
        .ok_or_else(|| anyhow!("history should load"))?;
    assert_eq!(page.entries.len(), 1);
    assert_eq!(page.payment.as_deref(), Some("5 RON"));
    assert!(sync.list_children(&scope, &key)?.is_accepted());

    sync.delete(&scope, &key)?;

    let captured = handle.join().expect("server thread should join");
    let add = captured[0].form();
    assert_eq!(captured[0].url, "/api/addVehicle");
    assert_eq!(add.get("subscriptionName").map(String::as_str), Some("Family"));
    assert_eq!(add.get("activityData").map(String::as_str), Some(r#"["note"]"#));
    assert_eq!(captured[1].url, "/api/getVehicleHistory");
    assert_eq!(captured[2].url, "/api/deleteVehicle");
    assert_eq!(
        captured[2].form().get("licensePlate").map(String::as_str),
        Some("B123ABC")
    );
    Ok(())
}

#[test]
fn accepted_vehicle_without_row_is_an_error() -> Result<()> {
    let (addr, handle) = serve(vec![(200, r#"{"success":true,"vehiclesTable":[]}"#)])?;
    let client = client(&addr)?;

    let error = client
        .add_vehicle("ana@pop.ro", "Family", "B123ABC", &[])
        .expect_err("empty table should fail");
    assert!(error.to_string().contains("sent no row back"));

    handle.join().expect("server thread should join");
    Ok(())
}

#[test]
fn admin_emails_accept_flat_and_nested_entries() -> Result<()> {
    let (addr, handle) = serve(vec![(
        200,
        r#"{"success":true,"emailsTable":["ana@pop.ro",["ion@pop.ro","2024-03-01"]]}"#,
    )])?;

    let emails = client(&addr)?
        .admin_emails()?
        .accepted()
        .ok_or_else(|| anyhow!("admin table should load"))?;
    assert_eq!(emails[0], vec!["ana@pop.ro".to_owned()]);
    assert_eq!(emails[1].len(), 2);

    handle.join().expect("server thread should join");
    Ok(())
}
