//! Foreign calls into the host
//!
//! `(host-call "Type" "member" args..)`, also spelled `java-call`, has two
//! shapes, both resolved while compiling against the [host
//! bindings](crate::host):
//!
//! 1. A static function of `Type` named `member` taking as many arguments as
//!    given.
//! 2. Otherwise a static field of `Type` named `member`. With no further
//!    arguments the call is the field's value. Otherwise the next element
//!    must be a string naming an instance method of the field's declared type
//!    and the rest are that method's arguments.
//!
//! A target that isn't a type name literal is not supported. Resolution is by
//! name and arity only, so overloads of the same arity can't be told apart.
use crate::{
    compiler::{emit::arguments, state::State},
    core::{Error, Form},
    loader::Code,
};
use log::trace;
use std::sync::Arc;

pub fn call(s: &mut State, args: &[Form], line: usize) -> Result<Code, Error> {
    let (target, member, rest) = match args {
        [target, member, rest @ ..] => (target, member, rest),
        _ => return Err(Error::unsupported("`host-call` expects a type and a member name", line)),
    };

    let member = member
        .as_str()
        .ok_or_else(|| Error::unsupported("`host-call` member must be a string literal", line))?;

    let type_name = target.as_str().ok_or_else(|| {
        Error::unsupported("`host-call` on an instance expression is not supported", line)
    })?;

    let host = s.ctx.host;

    if let Some(function) = host.static_function(type_name, member, rest.len()) {
        trace!("Resolved {}.{}/{} as a static function", type_name, member, rest.len());
        let call = Arc::clone(&function.call);
        let args = arguments(s, rest)?;

        return Ok(Box::new(move |f| {
            let values = f.eval_all(&args)?;
            call(&values)
        }));
    }

    let field = host.static_field(type_name, member).ok_or_else(|| Error::HostResolution {
        type_name: type_name.to_string(),
        member: member.to_string(),
        arity: rest.len(),
        line,
    })?;
    let get = Arc::clone(&field.get);

    let (method, rest) = match rest {
        [] => {
            trace!("Resolved {}.{} as a static field", type_name, member);
            return Ok(Box::new(move |_| get()));
        }
        [method, rest @ ..] => (method, rest),
    };

    let method = method.as_str().ok_or_else(|| {
        Error::unsupported(format!("expected an instance method name after field `{}`", member), line)
    })?;

    let m = host.instance_method(&field.type_name, method, rest.len()).ok_or_else(|| {
        Error::HostResolution {
            type_name: field.type_name.clone(),
            member: method.to_string(),
            arity: rest.len(),
            line,
        }
    })?;

    trace!("Resolved {}.{} then {}.{}/{}", type_name, member, field.type_name, method, rest.len());
    let call = Arc::clone(&m.call);
    let args = arguments(s, rest)?;

    Ok(Box::new(move |f| {
        let receiver = get()?;
        let values = f.eval_all(&args)?;
        call(&receiver, &values)
    }))
}
