use povbridge::chat::InstructionQueue;
use povbridge::demo::{FlatWorld, SimulatedAgent};
use povbridge::server::ApiServer;
use povbridge::{Backend, Bridge, BridgeConfig};
use serde_json::Value;
use std::io::{Read, Write};
use std::net::TcpStream;
use std::sync::{Arc, Mutex};
use std::time::Duration;

fn start() -> (String, ApiServer) {
    let mut cfg = BridgeConfig::default();
    cfg.view_distance = 1;
    cfg.spawn_delay = Duration::from_millis(10);
    cfg.settle_delay = Duration::from_millis(10);
    let bridge = Bridge::new(cfg, Backend::software()).unwrap();
    let api = ApiServer::new(bridge, Arc::new(Mutex::new(InstructionQueue::new(Some("Agent".into())))));

    let server = ApiServer::bind("127.0.0.1:0").unwrap();
    let addr = server.server_addr().to_string();
    let serving = api.clone();
    std::thread::spawn(move || serving.serve(server));
    (addr, api)
}

fn call(addr: &str, method: &str, path: &str) -> (u16, Value) {
    let mut stream = TcpStream::connect(addr).unwrap();
    write!(
        stream,
        "{} {} HTTP/1.1\r\nHost: localhost\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
        method, path
    )
    .unwrap();
    let mut raw = String::new();
    stream.read_to_string(&mut raw).unwrap();

    let status: u16 = raw.split_whitespace().nth(1).unwrap().parse().unwrap();
    let body = raw.split("\r\n\r\n").nth(1).unwrap();
    (status, serde_json::from_str(body).unwrap())
}

#[test]
fn screenshot_without_agent_is_black_success() {
    let (addr, _api) = start();
    let (status, body) = call(&addr, "POST", "/screenshot");
    assert_eq!(status, 200);
    assert_eq!(body["success"], true);
    assert_eq!(body["format"], "jpeg");
    assert_eq!(body["width"], 640);
    assert_eq!(body["height"], 360);
    assert!(!body["image"].as_str().unwrap().is_empty());
}

#[test]
fn status_routes_track_the_agent() {
    let (addr, api) = start();
    let (_, viewer) = call(&addr, "GET", "/viewer/status");
    assert_eq!(viewer["viewerReady"], false);
    assert_eq!(viewer["hasSession"], false);
    assert_eq!(viewer["phase"], "idle");

    let (_, before) = call(&addr, "GET", "/status");
    assert_eq!(before["connected"], false);
    let (_, obs) = call(&addr, "GET", "/observation");
    assert_eq!(obs["success"], false);

    let agent = Arc::new(SimulatedAgent::new("Agent", Arc::new(FlatWorld::default())));
    api.bridge().agent_spawned_blocking(agent).unwrap();

    let (_, after) = call(&addr, "GET", "/status");
    assert_eq!(after["connected"], true);
    assert_eq!(after["username"], "Agent");

    let (_, obs) = call(&addr, "GET", "/observation?verbose=1");
    assert_eq!(obs["success"], true);
    assert_eq!(obs["observation"]["health"], 20.0);
    assert_eq!(obs["observation"]["gameMode"], "survival");
}

#[test]
fn chat_queue_over_http() {
    let (addr, api) = start();
    {
        let queue = api.chat_queue();
        let mut q = queue.lock().unwrap();
        q.on_chat("Agent", "ignored", 1);
        q.on_chat("alice", "collect wood", 2);
    }

    let (_, listed) = call(&addr, "POST", "/chat/instructions");
    assert_eq!(listed["instructions"].as_array().unwrap().len(), 1);

    let (_, started) = call(&addr, "POST", "/chat/start_instruction");
    assert_eq!(started["instruction"]["message"], "collect wood");
    assert_eq!(started["instruction"]["timestamp"], 2);

    let (_, listed) = call(&addr, "POST", "/chat/instructions");
    assert_eq!(listed["current"]["username"], "alice");

    let (_, cleared) = call(&addr, "POST", "/chat/clear_instruction");
    assert_eq!(cleared["success"], true);
    let (_, listed) = call(&addr, "POST", "/chat/instructions");
    assert!(listed["current"].is_null());
}

#[test]
fn wrong_method_is_not_found() {
    let (addr, _api) = start();
    let (status, body) = call(&addr, "GET", "/screenshot");
    assert_eq!(status, 404);
    assert_eq!(body["success"], false);
}

#[test]
fn agent_chat_reaches_the_queue() {
    let (addr, api) = start();
    let agent = Arc::new(SimulatedAgent::new("Agent", Arc::new(FlatWorld::default())));
    api.bridge().agent_spawned_blocking(agent.clone()).unwrap();

    agent.say("Agent", "on my way");
    agent.say("alice", "mine some iron");
    let (_, listed) = call(&addr, "POST", "/chat/instructions");
    let pending = listed["instructions"].as_array().unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0]["username"], "alice");
    assert!(pending[0]["timestamp"].as_u64().unwrap() > 0);

    agent.say("bob", "reset");
    let (_, listed) = call(&addr, "POST", "/chat/instructions");
    assert!(listed["instructions"].as_array().unwrap().is_empty());
}
