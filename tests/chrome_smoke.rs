//! Smoke test against a real Chromium. Needs a local Chrome/Chromium install
//! (or `WEBQA_CHROME_PATH`), so it only runs with `cargo test -- --ignored`.

use std::path::Path;
use std::time::Duration;

use webqa::browser::ChromeLauncher;
use webqa::dsl::parse_test_definition;
use webqa::interpreter::{Interpreter, InterpreterConfig};

const PAGE: &str = "data:text/html,<html><body>\
<h1 id='title'>Welcome, user</h1>\
<input id='name'>\
<select id='color'><option value='red'>Red</option><option value='green'>Green</option></select>\
<div id='box' style='margin:40px;width:100px;height:60px;background:teal'>box</div>\
</body></html>";

#[tokio::test]
#[ignore]
async fn test_chromium_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    let definition = parse_test_definition(
        &serde_json::json!({
            "test_name": "chrome smoke",
            "steps": [
                { "action": "goto", "url": PAGE },
                { "action": "wait_for", "selector": "#title", "timeout": 5000 },
                { "action": "type", "selector": "#name", "text": "alice" },
                { "action": "select", "selector": "#color", "value": "green" },
                { "action": "press", "key": "Tab" },
                { "action": "assert_text", "selector": "#title", "text": "Welcome" },
                { "action": "assert_visible", "selector": "#box" },
                { "action": "screenshot", "name": "page" },
                { "action": "screenshot_element", "selector": "#box", "name": "box" },
                { "action": "wait", "duration": 200 }
            ]
        })
        .to_string(),
    )
    .unwrap();

    let config = InterpreterConfig::default()
        .recordings_dir(dir.path())
        .action_timeout(Duration::from_secs(10))
        .video_poll_attempts(3);
    let interpreter = Interpreter::with_config(ChromeLauncher::from_config(), config);

    let result = interpreter.execute_test(&definition).await;

    assert!(result.success, "run failed: {:?}", result.error);
    assert_eq!(result.screenshots.len(), 2);
    for shot in &result.screenshots {
        assert!(Path::new(shot).exists());
    }
    let video = result.video_path.expect("recording should be written");
    assert!(video.ends_with(".gif"));
}
