//! # Cola Lock-Free de Jobs
//! src/jobs/queue.rs
//!
//! Ring buffer de capacidad fija entre el dispatcher (único productor) y
//! los workers (múltiples consumidores). No hay mutex en el camino caliente:
//! todo el protocolo son dos índices atómicos.
//!
//! ## Protocolo
//!
//! ```text
//! productor:  head(relaxed) → ¿head+1 alcanza tail(acquire)? → llena
//!             escribir slot[head] → head = head+1 (release)
//!
//! consumidor: tail(relaxed) → head(acquire) → ¿iguales? → vacía
//!             copiar slot[tail] → CAS tail → tail+1 (release/relaxed)
//!             si el CAS falla, otro consumidor ganó: descartar la copia
//! ```
//!
//! Un slot siempre queda libre para distinguir llena de vacía, así que la
//! capacidad útil es `capacity - 1`.
//!
//! Los índices avanzan sin límite y se enmascaran solo al indexar el buffer.
//! Con índices ya enmascarados un consumidor detenido podría ganar el CAS
//! después de que la cola diera una vuelta completa (ABA) y entregar una
//! copia vieja.

use crate::jobs::job::Job;
use std::ops::Deref;
use std::os::fd::{FromRawFd, IntoRawFd, OwnedFd, RawFd};
use std::sync::atomic::{AtomicBool, AtomicI32, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

/// Alinea un valor a su propia línea de caché (evita false sharing entre
/// `head` y `tail`)
#[repr(align(64))]
struct CachePadded<T>(T);

impl<T> Deref for CachePadded<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.0
    }
}

/// Copia plana de un job tal como vive en un slot
#[derive(Clone, Copy)]
struct SlotRecord {
    fd: RawFd,
    enqueued_at_ms: u64,
    keep_alive: bool,
    timeout_ms: u64,
}

/// Un slot del ring
///
/// Cada campo es atómico: la copia especulativa de un consumidor puede
/// coincidir con una escritura del productor sobre el mismo slot. Esa copia
/// se descarta (su CAS falla), pero la lectura en sí no puede ser un data race.
/// El orden lo establece el par release/acquire sobre `head`, así que aquí
/// basta con `Relaxed`.
struct Slot {
    fd: AtomicI32,
    enqueued_at_ms: AtomicU64,
    keep_alive: AtomicBool,
    timeout_ms: AtomicU64,
}

impl Slot {
    fn empty() -> Self {
        Self {
            fd: AtomicI32::new(-1),
            enqueued_at_ms: AtomicU64::new(0),
            keep_alive: AtomicBool::new(false),
            timeout_ms: AtomicU64::new(0),
        }
    }

    fn store(&self, record: SlotRecord) {
        self.fd.store(record.fd, Ordering::Relaxed);
        self.enqueued_at_ms.store(record.enqueued_at_ms, Ordering::Relaxed);
        self.keep_alive.store(record.keep_alive, Ordering::Relaxed);
        self.timeout_ms.store(record.timeout_ms, Ordering::Relaxed);
    }

    fn load(&self) -> SlotRecord {
        SlotRecord {
            fd: self.fd.load(Ordering::Relaxed),
            enqueued_at_ms: self.enqueued_at_ms.load(Ordering::Relaxed),
            keep_alive: self.keep_alive.load(Ordering::Relaxed),
            timeout_ms: self.timeout_ms.load(Ordering::Relaxed),
        }
    }
}

/// Cola acotada single-producer / multi-consumer
pub struct JobQueue {
    /// Próximo slot a llenar. Solo lo escribe el productor.
    head: CachePadded<AtomicUsize>,

    /// Próximo slot a reclamar. Los consumidores compiten con CAS.
    tail: CachePadded<AtomicUsize>,

    slots: Box<[Slot]>,
    mask: usize,
}

impl JobQueue {
    /// Crea una cola con `capacity` slots
    ///
    /// # Panics
    ///
    /// Si `capacity` no es potencia de dos o es menor que 2. Es un contrato
    /// del llamador (`Config::validate` lo comprueba antes).
    pub fn new(capacity: usize) -> Self {
        assert!(
            capacity >= 2 && capacity.is_power_of_two(),
            "queue capacity must be a power of two >= 2 (got {})",
            capacity
        );

        let slots = (0..capacity).map(|_| Slot::empty()).collect::<Vec<_>>();

        Self {
            head: CachePadded(AtomicUsize::new(0)),
            tail: CachePadded(AtomicUsize::new(0)),
            slots: slots.into_boxed_slice(),
            mask: capacity - 1,
        }
    }

    /// Encola un job (solo desde el único productor)
    ///
    /// Nunca bloquea. Si la cola está llena devuelve el job intacto en
    /// `Err`: es una señal de backpressure, no un error.
    pub fn enqueue(&self, job: Job) -> Result<(), Job> {
        let head = self.head.load(Ordering::Relaxed);
        let next_head = head.wrapping_add(1);

        if next_head.wrapping_sub(self.tail.load(Ordering::Acquire)) >= self.slots.len() {
            return Err(job);
        }

        let (socket, enqueued_at_ms, keep_alive, timeout) = job.into_parts();
        self.slots[head & self.mask].store(SlotRecord {
            fd: socket.into_raw_fd(),
            enqueued_at_ms,
            keep_alive,
            timeout_ms: timeout.as_millis() as u64,
        });

        self.head.store(next_head, Ordering::Release);
        Ok(())
    }

    /// Desencola un job; `None` si la cola está vacía
    ///
    /// Seguro para cualquier número de consumidores concurrentes.
    pub fn dequeue(&self) -> Option<Job> {
        let mut tail = self.tail.load(Ordering::Relaxed);

        loop {
            let head = self.head.load(Ordering::Acquire);
            // `tail` se leyó relaxed: puede ser más nuevo que el `head` visto.
            // Cero o "negativo" se trata igual que cola vacía.
            if (head.wrapping_sub(tail) as isize) <= 0 {
                return None;
            }

            // Copia antes del CAS: si perdemos la carrera la copia se tira
            let record = self.slots[tail & self.mask].load();
            let next_tail = tail.wrapping_add(1);

            match self.tail.compare_exchange_weak(
                tail,
                next_tail,
                Ordering::Release,
                Ordering::Relaxed,
            ) {
                Ok(_) => {
                    // SAFETY: el CAS ganado nos da el slot en exclusiva; el fd
                    // salió de un `OwnedFd` en `enqueue` y nadie más lo reclama.
                    let socket = unsafe { OwnedFd::from_raw_fd(record.fd) };
                    return Some(Job::from_fd(
                        socket,
                        record.enqueued_at_ms,
                        record.keep_alive,
                        Duration::from_millis(record.timeout_ms),
                    ));
                }
                Err(observed) => tail = observed,
            }
        }
    }

    /// Tamaño aproximado (snapshot con carreras, solo para diagnóstico)
    pub fn size_approx(&self) -> usize {
        let head = self.head.load(Ordering::Relaxed);
        let tail = self.tail.load(Ordering::Relaxed);
        let len = head.wrapping_sub(tail) as isize;
        (len.max(0) as usize).min(self.slots.len() - 1)
    }

    /// Número de slots (la capacidad útil es uno menos)
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.size_approx() == 0
    }
}

impl Drop for JobQueue {
    /// Cierra los sockets de los jobs que nunca llegaron a un worker
    fn drop(&mut self) {
        while let Some(job) = self.dequeue() {
            drop(job);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::fs::File;
    use std::io::Read;
    use std::os::unix::net::UnixStream;
    use std::sync::atomic::AtomicBool;
    use std::sync::{Arc, Mutex};
    use std::thread;

    fn job(seq: u64) -> Job {
        let fd = OwnedFd::from(File::open("/dev/null").unwrap());
        Job::from_fd(fd, seq, true, Duration::from_millis(5000))
    }

    #[test]
    #[should_panic]
    fn test_capacity_must_be_power_of_two() {
        let _ = JobQueue::new(100);
    }

    #[test]
    fn test_empty_queue() {
        let queue = JobQueue::new(8);
        assert!(queue.dequeue().is_none());
        assert!(queue.is_empty());
        assert_eq!(queue.capacity(), 8);
    }

    #[test]
    fn test_usable_capacity_is_c_minus_one() {
        let queue = JobQueue::new(8);

        for i in 0..7 {
            assert!(queue.enqueue(job(i)).is_ok(), "enqueue {} should fit", i);
        }
        assert_eq!(queue.size_approx(), 7);

        // El octavo no cabe y se devuelve el mismo job
        let rejected = queue.enqueue(job(99)).unwrap_err();
        assert_eq!(rejected.enqueued_at_ms, 99);

        // Un dequeue libera exactamente un lugar
        assert_eq!(queue.dequeue().unwrap().enqueued_at_ms, 0);
        assert!(queue.enqueue(job(7)).is_ok());
        assert!(queue.enqueue(job(8)).is_err());
    }

    #[test]
    fn test_fifo_order_and_fields() {
        let queue = JobQueue::new(4);
        let fd = OwnedFd::from(File::open("/dev/null").unwrap());
        queue
            .enqueue(Job::from_fd(fd, 42, false, Duration::from_millis(1234)))
            .unwrap();
        queue.enqueue(job(43)).unwrap();

        let first = queue.dequeue().unwrap();
        assert_eq!(first.enqueued_at_ms, 42);
        assert!(!first.keep_alive);
        assert_eq!(first.timeout, Duration::from_millis(1234));

        assert_eq!(queue.dequeue().unwrap().enqueued_at_ms, 43);
        assert!(queue.dequeue().is_none());
    }

    #[test]
    fn test_wraps_around_many_times() {
        let queue = JobQueue::new(4);
        for i in 0..100 {
            queue.enqueue(job(i)).unwrap();
            assert_eq!(queue.dequeue().unwrap().enqueued_at_ms, i);
        }
        assert!(queue.is_empty());
    }

    #[test]
    fn test_one_producer_many_consumers_exactly_once() {
        const TOTAL: u64 = 5_000;
        const CONSUMERS: usize = 4;

        let queue = Arc::new(JobQueue::new(64));
        let done = Arc::new(AtomicBool::new(false));
        let seen = Arc::new(Mutex::new(Vec::new()));

        let consumers: Vec<_> = (0..CONSUMERS)
            .map(|_| {
                let queue = Arc::clone(&queue);
                let done = Arc::clone(&done);
                let seen = Arc::clone(&seen);
                thread::spawn(move || {
                    let mut local = Vec::new();
                    loop {
                        match queue.dequeue() {
                            Some(job) => local.push(job.enqueued_at_ms),
                            None if done.load(Ordering::Acquire) => {
                                // Vaciar lo que quede tras la última publicación
                                while let Some(job) = queue.dequeue() {
                                    local.push(job.enqueued_at_ms);
                                }
                                break;
                            }
                            None => thread::yield_now(),
                        }
                    }
                    seen.lock().unwrap().extend(local);
                })
            })
            .collect();

        for i in 0..TOTAL {
            let mut pending = job(i);
            loop {
                match queue.enqueue(pending) {
                    Ok(()) => break,
                    Err(back) => {
                        pending = back;
                        thread::yield_now();
                    }
                }
            }
        }
        done.store(true, Ordering::Release);

        for handle in consumers {
            handle.join().unwrap();
        }

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len() as u64, TOTAL, "ningún job perdido ni duplicado");
        let unique: HashSet<_> = seen.iter().copied().collect();
        assert_eq!(unique.len() as u64, TOTAL);
    }

    #[test]
    fn test_drop_closes_pending_sockets() {
        let (ours, mut theirs) = UnixStream::pair().unwrap();
        let queue = JobQueue::new(4);
        queue
            .enqueue(Job::from_fd(OwnedFd::from(ours), 0, true, Duration::from_secs(1)))
            .unwrap();

        drop(queue);

        // El otro extremo ve EOF: el fd encolado se cerró
        let mut buf = [0u8; 1];
        assert_eq!(theirs.read(&mut buf).unwrap(), 0);
    }
}
