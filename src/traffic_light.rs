use crate::frame::Frame;
use crate::map::WaypointMap;
use crate::messages::{
    LocalizationToTrafficLight, LocalizationToTrafficLightMessenger, TrafficLightToPlanner,
    TrafficLightToPlannerMessenger,
};
use crate::messenger::DataPacket;
use crate::stage::Stage;
use crate::util::lock;
use crate::world::{LightState, World};
use crate::ActorId;
use std::ops::Range;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

struct MessengerStates {
    localization: i64,
    planner: i64,
}

/// The stage that keeps vehicles out of junctions governed by a light
/// that is not green.
pub struct TrafficLightStage {
    world: Arc<dyn World>,
    map: Arc<WaypointMap>,

    localization_messenger: Arc<LocalizationToTrafficLightMessenger>,
    planner_messenger: Arc<TrafficLightToPlannerMessenger>,
    planner_frames: [Arc<Frame<TrafficLightToPlanner>>; 2],
    frame_selector: AtomicBool,
    messenger_states: Mutex<MessengerStates>,

    input: Mutex<Option<Arc<Frame<LocalizationToTrafficLight>>>>,
}

impl TrafficLightStage {
    pub fn new(
        world: Arc<dyn World>,
        map: Arc<WaypointMap>,
        actors: &[ActorId],
        localization_messenger: Arc<LocalizationToTrafficLightMessenger>,
        planner_messenger: Arc<TrafficLightToPlannerMessenger>,
    ) -> Self {
        let vehicles = actors.len();
        let messenger_states = MessengerStates {
            localization: localization_messenger.state() - 1,
            planner: planner_messenger.state() - 1,
        };
        Self {
            world,
            map,
            localization_messenger,
            planner_messenger,
            planner_frames: [Arc::new(Frame::new(vehicles)), Arc::new(Frame::new(vehicles))],
            frame_selector: AtomicBool::new(true),
            messenger_states: Mutex::new(messenger_states),
            input: Mutex::new(None),
        }
    }
}

impl Stage for TrafficLightStage {
    fn name(&self) -> &'static str {
        "traffic-light"
    }

    fn receive(&self) {
        let localization_state = lock(&self.messenger_states).localization;
        if let Some(packet) = self.localization_messenger.receive(localization_state) {
            lock(&self.messenger_states).localization = packet.id;
            *lock(&self.input) = Some(packet.data);
        }
    }

    fn action(&self, range: Range<usize>) {
        let Some(input) = lock(&self.input).clone() else {
            return;
        };
        let selector = self.frame_selector.load(Ordering::SeqCst) as usize;
        for index in range {
            let Some(message) = input.get(index) else {
                continue;
            };
            let must_stop = self.map[message.junction_look_ahead].is_junction
                && self.world.light_state(message.actor) != LightState::Green;
            self.planner_frames[selector].set(
                index,
                TrafficLightToPlanner {
                    actor: message.actor,
                    must_stop,
                },
            );
        }
    }

    fn send(&self) {
        let mut states = lock(&self.messenger_states);
        let selector = self.frame_selector.load(Ordering::SeqCst) as usize;
        let packet = DataPacket {
            id: states.planner,
            data: self.planner_frames[selector].clone(),
        };
        self.frame_selector.store(selector == 0, Ordering::SeqCst);
        states.planner = self.planner_messenger.send(packet);
    }

    fn stop_messengers(&self) {
        self.localization_messenger.stop();
        self.planner_messenger.stop();
    }
}
