//! JSON request/response surface over `tiny_http`.

use crate::bridge::Bridge;
use crate::chat::InstructionQueue;
use crate::{Error, Result};
use serde_json::{json, Value};
use std::sync::{Arc, Mutex, MutexGuard};
use tiny_http::{Header, Method, Request, Response, Server};

#[derive(Clone)]
pub struct ApiServer {
    bridge: Bridge,
    chat: Arc<Mutex<InstructionQueue>>,
}

impl ApiServer {
    pub fn new(bridge: Bridge, chat: Arc<Mutex<InstructionQueue>>) -> Self {
        Self { bridge, chat }
    }

    pub fn bridge(&self) -> &Bridge {
        &self.bridge
    }

    /// Shared handle for whatever feeds game chat into the queue.
    pub fn chat_queue(&self) -> Arc<Mutex<InstructionQueue>> {
        self.chat.clone()
    }

    fn queue(&self) -> MutexGuard<'_, InstructionQueue> {
        self.chat.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Move chat the agent received into the instruction queue.
    fn sync_chat(&self) -> Result<()> {
        let lines = self.bridge.chat_blocking()?;
        if lines.is_empty() {
            return Ok(());
        }
        let mut q = self.queue();
        for line in lines {
            q.on_chat(&line.username, &line.message, line.timestamp);
        }
        Ok(())
    }

    pub fn bind(addr: &str) -> Result<Server> {
        Server::http(addr).map_err(|e| Error::Other(format!("bind {}: {}", addr, e)))
    }

    /// Answer requests until the listener shuts down.
    pub fn serve(&self, server: Server) {
        for request in server.incoming_requests() {
            self.respond(request);
        }
    }

    fn respond(&self, request: Request) {
        let path = request.url().split('?').next().unwrap_or("/").to_string();
        let (status, body) = self.handle(request.method(), &path);
        log::debug!("{} {} -> {}", request.method(), path, status);

        let mut response = Response::from_string(body.to_string()).with_status_code(status);
        if let Ok(header) = Header::from_bytes(&b"Content-Type"[..], &b"application/json"[..]) {
            response = response.with_header(header);
        }
        if let Err(e) = request.respond(response) {
            log::warn!("failed to write response for {}: {}", path, e);
        }
    }

    /// Route one request to its JSON answer.
    pub fn handle(&self, method: &Method, path: &str) -> (u16, Value) {
        if path.starts_with("/chat/") {
            if let Err(e) = self.sync_chat() {
                log::warn!("could not fetch agent chat: {}", e);
            }
        }
        let result = match (method, path) {
            (Method::Post, "/screenshot") => self
                .bridge
                .capture_blocking()
                .and_then(|resp| serde_json::to_value(resp).map_err(|e| Error::Other(e.to_string()))),
            (Method::Get, "/status") => self.bridge.connection_blocking().map(|c| {
                json!({
                    "success": true,
                    "connected": c.connected,
                    "username": c.username,
                })
            }),
            (Method::Get, "/viewer/status") => self
                .bridge
                .status_blocking()
                .and_then(|s| serde_json::to_value(s).map_err(|e| Error::Other(e.to_string()))),
            (Method::Get, "/observation") => self.bridge.observation_blocking().map(|obs| match obs {
                Some(obs) => json!({ "success": true, "observation": obs }),
                None => json!({ "success": false, "error": "agent not connected" }),
            }),
            (Method::Post, "/chat/instructions") => {
                let q = self.queue();
                let pending: Vec<_> = q.pending().collect();
                Ok(json!({
                    "success": true,
                    "instructions": pending,
                    "current": q.current(),
                }))
            }
            (Method::Post, "/chat/start_instruction") => {
                let mut q = self.queue();
                Ok(json!({ "success": true, "instruction": q.start_next() }))
            }
            (Method::Post, "/chat/clear_instruction") => {
                self.queue().clear_current();
                Ok(json!({ "success": true }))
            }
            _ => return (404, json!({ "success": false, "error": format!("no route for {}", path) })),
        };

        match result {
            Ok(body) => (200, body),
            Err(e) => {
                log::error!("{} {} failed: {}", method, path, e);
                (500, json!({ "success": false, "error": e.to_string() }))
            }
        }
    }
}
