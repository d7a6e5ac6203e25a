use std::collections::HashMap;

use tera::Value;

/// 单引号包裹，值中的单引号写成 `'\''`
pub fn sh_escape(value: &str) -> String {
    let mut out = String::from("'");
    out.push_str(&value.replace('\'', r"'\''"));
    out.push('\'');
    out
}

/// Tera过滤器 `sh`: 把任意值转成一个shell单词
pub fn sh_filter(value: &Value, _args: &HashMap<String, Value>) -> tera::Result<Value> {
    let text = match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    Ok(Value::String(sh_escape(&text)))
}
