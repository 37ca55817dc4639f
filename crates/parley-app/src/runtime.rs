//! Generic runtime for application orchestration.
//!
//! The Runtime drives the application event loop, coordinating between:
//! - [`App`]: UI state machine
//! - [`Bridge`]: session bridge to the Client
//! - [`Driver`]: platform-specific I/O
//! - [`Prefs`]: remembered identity and room

use parley_client::{ClientConfig, Environment};

use crate::{App, AppAction, AppEvent, Bridge, Driver, Input, prefs::Prefs};

/// Generic runtime that orchestrates App, Bridge, and Driver.
///
/// # Type Parameters
///
/// - `D`: Platform-specific I/O driver
/// - `E`: Environment for time and randomness
/// - `P`: Preference store
pub struct Runtime<D, E, P>
where
    D: Driver,
    E: Environment,
    P: Prefs,
{
    driver: D,
    app: App,
    bridge: Bridge<E>,
    prefs: P,
}

impl<D, E, P> Runtime<D, E, P>
where
    D: Driver<Instant = E::Instant>,
    E: Environment,
    P: Prefs,
{
    /// Create a runtime, pre-filling the entry form from `prefs`.
    pub fn new(driver: D, env: E, config: ClientConfig, prefs: P, server_url: String) -> Self {
        let saved = prefs.load().unwrap_or_else(|e| {
            tracing::warn!(error = %e, "failed to load preferences");
            Default::default()
        });
        let app = App::with_saved(server_url, &saved);
        let bridge = Bridge::new(env, config);
        Self { driver, app, bridge, prefs }
    }

    /// Run the main event loop.
    ///
    /// Each cycle:
    /// 1. Polls the driver for one input
    /// 2. Routes it to the App or the Bridge
    /// 3. Processes actions and events between App and Bridge until quiet
    /// 4. Hands queued I/O requests to the driver
    ///
    /// # Errors
    ///
    /// Returns an error if the driver encounters an I/O error.
    pub async fn run(mut self) -> Result<(), D::Error> {
        self.driver.render(&self.app, self.bridge.view())?;

        loop {
            let Some(input) = self.driver.poll().await? else {
                tracing::debug!("input exhausted");
                break;
            };
            if self.process_input(input).await? {
                break;
            }
        }

        self.bridge.shutdown();
        self.flush_io().await?;
        self.driver.stop();
        Ok(())
    }

    /// Process one input. Returns `true` if the application should quit.
    pub async fn process_input(&mut self, input: Input<D::Instant>) -> Result<bool, D::Error> {
        let quit = match input {
            Input::App(AppEvent::Tick) => {
                let actions = self.app.handle(AppEvent::Tick);
                if self.process_actions(actions)? {
                    return Ok(true);
                }
                let now = self.driver.now();
                let events = self.bridge.handle_tick(now);
                self.process_bridge_events(events)?
            },
            Input::App(event) => {
                let actions = self.app.handle(event);
                self.process_actions(actions)?
            },
            Input::Client(event) => {
                let events = self.bridge.handle_client_event(event);
                self.process_bridge_events(events)?
            },
        };

        self.flush_io().await?;
        Ok(quit)
    }

    /// Process actions returned by the App.
    ///
    /// Returns `true` if should quit.
    fn process_actions(&mut self, initial_actions: Vec<AppAction>) -> Result<bool, D::Error> {
        let mut pending_actions = initial_actions;

        while !pending_actions.is_empty() {
            let actions = std::mem::take(&mut pending_actions);

            for action in actions {
                match action {
                    AppAction::Render => self.driver.render(&self.app, self.bridge.view())?,
                    AppAction::Quit => return Ok(true),
                    AppAction::Persist(update) => {
                        if let Err(e) = self.prefs.apply(&update) {
                            tracing::warn!(error = %e, ?update, "failed to persist preferences");
                        }
                    },

                    // Session operations go through the bridge
                    action => {
                        let events = self.bridge.process_app_action(action);
                        for event in events {
                            let new_actions = self.app.handle(event);
                            pending_actions.extend(new_actions);
                        }
                    },
                }
            }
        }
        Ok(false)
    }

    /// Process events from Bridge back to App.
    fn process_bridge_events(&mut self, events: Vec<AppEvent>) -> Result<bool, D::Error> {
        for event in events {
            let actions = self.app.handle(event);
            if self.process_actions(actions)? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Hand every queued I/O request to the driver.
    async fn flush_io(&mut self) -> Result<(), D::Error> {
        for request in self.bridge.take_io() {
            self.driver.perform(request).await?;
        }
        Ok(())
    }

    /// Get a reference to the App
    pub fn app(&self) -> &App {
        &self.app
    }

    /// Get a reference to the Bridge
    pub fn bridge(&self) -> &Bridge<E> {
        &self.bridge
    }

    /// Get a reference to the Driver
    pub fn driver(&self) -> &D {
        &self.driver
    }
}
