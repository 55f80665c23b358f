use wasm_bindgen::JsValue;

pub(crate) fn js_err(msg: &str) -> JsValue {
    JsValue::from_str(msg)
}

pub(crate) fn js_get(obj: &JsValue, key: &str) -> Option<JsValue> {
    js_sys::Reflect::get(obj, &JsValue::from_str(key))
        .ok()
        .filter(|v| !v.is_undefined() && !v.is_null())
}

pub(crate) fn js_bool(obj: &JsValue, key: &str) -> bool {
    js_get(obj, key).and_then(|v| v.as_bool()).unwrap_or(false)
}
