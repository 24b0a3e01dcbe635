//! Onion-order and short-circuit laws for arbitrary pipelines.

use std::sync::{Arc, Mutex};

use http::{Method, Uri};
use proptest::prelude::*;
use shallot::{App, RawRequest};

type Log = Arc<Mutex<Vec<String>>>;

/// A pipeline of `len` recording layers. Layer `stop`, if any, does not call
/// `next`.
fn pipeline(len: usize, stop: Option<usize>, log: &Log) -> App {
    (0..len).fold(App::new(), |app, i| {
        let log = Arc::clone(log);
        app.use_fn(move |ctx, next| {
            let log = Arc::clone(&log);
            Box::pin(async move {
                log.lock().unwrap().push(format!("enter {i}"));
                if stop != Some(i) {
                    next.run(ctx).await?;
                }
                log.lock().unwrap().push(format!("exit {i}"));
                Ok(())
            })
        })
    })
}

fn expected(len: usize, stop: Option<usize>) -> Vec<String> {
    let reached = stop.map_or(len, |k| k + 1);
    let enters = (0..reached).map(|i| format!("enter {i}"));
    let exits = (0..reached).rev().map(|i| format!("exit {i}"));
    enters.chain(exits).collect()
}

fn run(app: App) {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .build()
        .unwrap();
    runtime.block_on(async {
        app.callback()
            .handle(RawRequest::new(Method::GET, Uri::from_static("/")))
            .await;
    });
}

proptest! {
    #[test]
    fn layers_nest(len in 0usize..16) {
        let log = Log::default();
        run(pipeline(len, None, &log));
        prop_assert_eq!(log.lock().unwrap().clone(), expected(len, None));
    }

    #[test]
    fn stopping_layer_unwinds_immediately((len, stop) in (1usize..16).prop_flat_map(|len| (Just(len), 0..len))) {
        let log = Log::default();
        run(pipeline(len, Some(stop), &log));

        let seen = log.lock().unwrap().clone();
        prop_assert_eq!(&seen, &expected(len, Some(stop)));
        for i in stop + 1..len {
            let marker = format!("enter {i}");
            prop_assert!(!seen.contains(&marker));
        }
    }
}
