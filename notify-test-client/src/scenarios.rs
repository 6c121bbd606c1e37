use crate::api_client::ApiClient;
use crate::sse_client::Connection;
use anyhow::Result;
use colored::*;
use std::time::Duration;
use uuid::Uuid;

/// How long to wait for an expected event before declaring it lost.
const EVENT_TIMEOUT: Duration = Duration::from_secs(5);

/// How long a connection must stay quiet before we accept that an event
/// really was not routed to it.
const SILENCE_WINDOW: Duration = Duration::from_millis(750);

pub struct TestResult {
    pub name: String,
    pub passed: bool,
    pub details: String,
}

fn pass(name: &str, details: impl Into<String>) -> TestResult {
    TestResult {
        name: name.to_string(),
        passed: true,
        details: details.into(),
    }
}

fn fail(name: &str, details: impl Into<String>) -> TestResult {
    TestResult {
        name: name.to_string(),
        passed: false,
        details: details.into(),
    }
}

/// Polls the status endpoint until the live connection count satisfies the
/// predicate. Stream registration happens server side a beat after the HTTP
/// request lands, so scenarios wait on this instead of sleeping blind.
async fn wait_for_connection_count(
    api: &ApiClient,
    what: &str,
    predicate: impl Fn(u64) -> bool,
) -> Result<u64> {
    for _ in 0..50 {
        let count = api.connection_count().await?;
        if predicate(count) {
            return Ok(count);
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    anyhow::bail!("Timed out waiting for connection count: {}", what);
}

/// Connect, confirm the server counts the connection, disconnect, confirm
/// the server cleans it up.
pub async fn connection_lifecycle(api: &ApiClient, base_url: &str) -> Result<TestResult> {
    const NAME: &str = "connection lifecycle";
    let baseline = api.connection_count().await?;

    println!("{} Establishing a stream connection...", "→".blue());
    let connection = Connection::establish(
        base_url,
        &Uuid::new_v4().to_string(),
        None,
        "Lifecycle probe".to_string(),
    )
    .await?;

    wait_for_connection_count(api, "registration", |count| count >= baseline + 1).await?;
    println!("{} Connection registered", "✓".green());

    connection.close();

    if wait_for_connection_count(api, "cleanup", |count| count <= baseline)
        .await
        .is_err()
    {
        return Ok(fail(
            NAME,
            "connection was not removed from the registry after disconnect",
        ));
    }
    println!("{} Connection cleaned up after disconnect", "✓".green());

    Ok(pass(NAME, "registered on connect, removed on disconnect"))
}

/// A notification addressed to one user must reach that user's connection
/// and nobody else's.
pub async fn targeted_notify(api: &ApiClient, base_url: &str) -> Result<TestResult> {
    const NAME: &str = "targeted notify";
    let baseline = api.connection_count().await?;
    let user1 = Uuid::new_v4().to_string();
    let user2 = Uuid::new_v4().to_string();

    let mut sse1 = Connection::establish(base_url, &user1, None, "User 1".to_string()).await?;
    let mut sse2 = Connection::establish(base_url, &user2, None, "User 2".to_string()).await?;
    wait_for_connection_count(api, "both streams", |count| count >= baseline + 2).await?;

    let text = format!("targeted {}", Uuid::new_v4());
    println!("{} Sending test notification to User 1...", "→".blue());
    api.send_test_notification(&user1, &text).await?;

    let result = match sse1.wait_for_event("notify", EVENT_TIMEOUT).await {
        Ok(event) if event.data["text"] == text.as_str() => {
            println!("{} User 1 received the notification", "✓".green());

            // One copy for the recipient, zero for the bystander.
            match (
                sse1.expect_silence(SILENCE_WINDOW).await,
                sse2.expect_silence(SILENCE_WINDOW).await,
            ) {
                (Ok(()), Ok(())) => pass(NAME, "delivered exactly once, isolated from other users"),
                (Err(e), _) | (_, Err(e)) => fail(NAME, e.to_string()),
            }
        }
        Ok(event) => fail(NAME, format!("unexpected payload: {}", event.data)),
        Err(e) => fail(NAME, e.to_string()),
    };

    sse1.close();
    sse2.close();
    Ok(result)
}

/// Two connections for the same user each get their own copy.
pub async fn multi_connection_fanout(api: &ApiClient, base_url: &str) -> Result<TestResult> {
    const NAME: &str = "multi-connection fan-out";
    let baseline = api.connection_count().await?;
    let user = Uuid::new_v4().to_string();

    let mut first = Connection::establish(base_url, &user, None, "Tab 1".to_string()).await?;
    let mut second = Connection::establish(base_url, &user, None, "Tab 2".to_string()).await?;
    wait_for_connection_count(api, "both streams", |count| count >= baseline + 2).await?;

    let text = format!("fan-out {}", Uuid::new_v4());
    println!(
        "{} Sending one notification to a user with two open streams...",
        "→".blue()
    );
    api.send_test_notification(&user, &text).await?;

    let mut result = pass(NAME, "each connection received exactly one copy");
    for connection in [&mut first, &mut second] {
        match connection.wait_for_event("notify", EVENT_TIMEOUT).await {
            Ok(event) if event.data["text"] == text.as_str() => {
                println!("{} {} received its copy", "✓".green(), connection.label);
            }
            Ok(event) => {
                result = fail(NAME, format!("unexpected payload: {}", event.data));
            }
            Err(e) => {
                result = fail(NAME, format!("{}: {}", connection.label, e));
            }
        }
    }
    if result.passed {
        for connection in [&mut first, &mut second] {
            if let Err(e) = connection.expect_silence(SILENCE_WINDOW).await {
                result = fail(NAME, e.to_string());
            }
        }
    }

    first.close();
    second.close();
    Ok(result)
}

/// An announcement with no topic reaches every connected client.
pub async fn broadcast(api: &ApiClient, base_url: &str) -> Result<TestResult> {
    const NAME: &str = "broadcast announcement";
    let baseline = api.connection_count().await?;

    let mut sse1 = Connection::establish(
        base_url,
        &Uuid::new_v4().to_string(),
        None,
        "User 1".to_string(),
    )
    .await?;
    let mut sse2 = Connection::establish(
        base_url,
        &Uuid::new_v4().to_string(),
        None,
        "User 2".to_string(),
    )
    .await?;
    wait_for_connection_count(api, "both streams", |count| count >= baseline + 2).await?;

    let text = format!("maintenance window {}", Uuid::new_v4());
    println!("{} Posting a broadcast announcement...", "→".blue());
    api.announce(&text, None).await?;

    let mut result = pass(NAME, "system notice reached every connection");
    for connection in [&mut sse1, &mut sse2] {
        match connection.wait_for_event("system_notice", EVENT_TIMEOUT).await {
            Ok(event) if event.data["text"] == text.as_str() => {
                println!("{} {} received the notice", "✓".green(), connection.label);
            }
            Ok(event) => {
                result = fail(NAME, format!("unexpected payload: {}", event.data));
            }
            Err(e) => {
                result = fail(NAME, format!("{}: {}", connection.label, e));
            }
        }
    }

    sse1.close();
    sse2.close();
    Ok(result)
}

/// An announcement scoped to a topic reaches topic subscribers only.
pub async fn topic_scope(api: &ApiClient, base_url: &str) -> Result<TestResult> {
    const NAME: &str = "topic-scoped announcement";
    let baseline = api.connection_count().await?;

    let mut subscriber = Connection::establish(
        base_url,
        &Uuid::new_v4().to_string(),
        Some("deployments"),
        "Topic subscriber".to_string(),
    )
    .await?;
    let mut bystander = Connection::establish(
        base_url,
        &Uuid::new_v4().to_string(),
        None,
        "Bystander".to_string(),
    )
    .await?;
    wait_for_connection_count(api, "both streams", |count| count >= baseline + 2).await?;

    let text = format!("deploy {}", Uuid::new_v4());
    println!(
        "{} Posting an announcement scoped to topic 'deployments'...",
        "→".blue()
    );
    api.announce(&text, Some("deployments")).await?;

    let result = match subscriber.wait_for_event("system_notice", EVENT_TIMEOUT).await {
        Ok(event) if event.data["text"] == text.as_str() => {
            println!("{} Topic subscriber received the notice", "✓".green());
            match bystander.expect_silence(SILENCE_WINDOW).await {
                Ok(()) => pass(NAME, "notice stayed within the topic group"),
                Err(e) => fail(NAME, e.to_string()),
            }
        }
        Ok(event) => fail(NAME, format!("unexpected payload: {}", event.data)),
        Err(e) => fail(NAME, e.to_string()),
    };

    subscriber.close();
    bystander.close();
    Ok(result)
}
