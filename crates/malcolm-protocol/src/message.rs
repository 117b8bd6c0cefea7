//! 请求 / 响应消息模型
//!
//! 只定义消息的 JSON 形状；字节级编码归传输层所有。
//!
//! 订阅的更新以 [`ResponseBody::Update`] 推送，`id` 与订阅请求的 `id` 相同。

use crate::ProtocolError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

/// 请求 ID（由会话分配，单调递增）
pub type RequestId = u64;

/// 设备上可调用的方法
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MalcolmMethod {
    Configure,
    Validate,
    Run,
    Abort,
    Pause,
    Resume,
    Reset,
    Disable,
}

impl MalcolmMethod {
    pub const fn as_str(&self) -> &'static str {
        match self {
            MalcolmMethod::Configure => "configure",
            MalcolmMethod::Validate => "validate",
            MalcolmMethod::Run => "run",
            MalcolmMethod::Abort => "abort",
            MalcolmMethod::Pause => "pause",
            MalcolmMethod::Resume => "resume",
            MalcolmMethod::Reset => "reset",
            MalcolmMethod::Disable => "disable",
        }
    }
}

impl fmt::Display for MalcolmMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MalcolmMethod {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "configure" => MalcolmMethod::Configure,
            "validate" => MalcolmMethod::Validate,
            "run" => MalcolmMethod::Run,
            "abort" => MalcolmMethod::Abort,
            "pause" => MalcolmMethod::Pause,
            "resume" => MalcolmMethod::Resume,
            "reset" => MalcolmMethod::Reset,
            "disable" => MalcolmMethod::Disable,
            other => return Err(ProtocolError::Malformed(format!("unknown method {other}"))),
        })
    }
}

/// 请求
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    pub id: RequestId,
    #[serde(flatten)]
    pub body: RequestBody,
}

/// 请求体
///
/// `endpoint` 为空字符串时指整个设备块。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "typeid")]
pub enum RequestBody {
    #[serde(rename = "malcolm:core/Get:1.0")]
    Get { endpoint: String },
    #[serde(rename = "malcolm:core/Put:1.0")]
    Put { endpoint: String, value: Value },
    #[serde(rename = "malcolm:core/Post:1.0")]
    Call {
        method: MalcolmMethod,
        parameters: Map<String, Value>,
    },
    #[serde(rename = "malcolm:core/Subscribe:1.0")]
    Subscribe { endpoint: String },
    #[serde(rename = "malcolm:core/Unsubscribe:1.0")]
    Unsubscribe,
}

impl Request {
    pub fn get(id: RequestId, endpoint: impl Into<String>) -> Self {
        Self {
            id,
            body: RequestBody::Get {
                endpoint: endpoint.into(),
            },
        }
    }

    pub fn put(id: RequestId, endpoint: impl Into<String>, value: Value) -> Self {
        Self {
            id,
            body: RequestBody::Put {
                endpoint: endpoint.into(),
                value,
            },
        }
    }

    pub fn call(id: RequestId, method: MalcolmMethod, parameters: Map<String, Value>) -> Self {
        Self {
            id,
            body: RequestBody::Call { method, parameters },
        }
    }

    pub fn subscribe(id: RequestId, endpoint: impl Into<String>) -> Self {
        Self {
            id,
            body: RequestBody::Subscribe {
                endpoint: endpoint.into(),
            },
        }
    }

    /// 取消 `id` 对应的订阅
    pub fn unsubscribe(id: RequestId) -> Self {
        Self {
            id,
            body: RequestBody::Unsubscribe,
        }
    }

    /// 日志用的简短描述
    pub fn describe(&self) -> String {
        match &self.body {
            RequestBody::Get { endpoint } => format!("GET {endpoint}"),
            RequestBody::Put { endpoint, .. } => format!("PUT {endpoint}"),
            RequestBody::Call { method, .. } => format!("CALL {method}"),
            RequestBody::Subscribe { endpoint } => format!("SUBSCRIBE {endpoint}"),
            RequestBody::Unsubscribe => format!("UNSUBSCRIBE {}", self.id),
        }
    }
}

/// 响应
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub id: RequestId,
    #[serde(flatten)]
    pub body: ResponseBody,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "typeid")]
pub enum ResponseBody {
    #[serde(rename = "malcolm:core/Return:1.0")]
    Return { value: Value },
    #[serde(rename = "malcolm:core/Error:1.0")]
    Error { message: String },
    #[serde(rename = "malcolm:core/Update:1.0")]
    Update { value: Value },
}

impl Response {
    pub fn ok(id: RequestId, value: Value) -> Self {
        Self {
            id,
            body: ResponseBody::Return { value },
        }
    }

    pub fn error(id: RequestId, message: impl Into<String>) -> Self {
        Self {
            id,
            body: ResponseBody::Error {
                message: message.into(),
            },
        }
    }

    pub fn update(id: RequestId, value: Value) -> Self {
        Self {
            id,
            body: ResponseBody::Update { value },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_call_wire_shape() {
        let mut params = Map::new();
        params.insert("completedSteps".to_string(), json!(5));
        let request = Request::call(7, MalcolmMethod::Pause, params);
        assert_eq!(
            serde_json::to_value(&request).unwrap(),
            json!({
                "id": 7,
                "typeid": "malcolm:core/Post:1.0",
                "method": "pause",
                "parameters": {"completedSteps": 5},
            })
        );
    }

    #[test]
    fn test_response_parse() {
        let response: Response = serde_json::from_value(json!({
            "id": 3,
            "typeid": "malcolm:core/Error:1.0",
            "message": "Invalid axis name: z",
        }))
        .unwrap();
        assert_eq!(response, Response::error(3, "Invalid axis name: z"));
    }

    #[test]
    fn test_method_names() {
        for method in [
            MalcolmMethod::Configure,
            MalcolmMethod::Validate,
            MalcolmMethod::Run,
            MalcolmMethod::Abort,
            MalcolmMethod::Pause,
            MalcolmMethod::Resume,
            MalcolmMethod::Reset,
            MalcolmMethod::Disable,
        ] {
            assert_eq!(method.as_str().parse::<MalcolmMethod>().unwrap(), method);
        }
    }

    #[test]
    fn test_describe() {
        assert_eq!(Request::get(1, "state").describe(), "GET state");
        assert_eq!(Request::unsubscribe(4).describe(), "UNSUBSCRIBE 4");
    }
}
